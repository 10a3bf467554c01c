// postsmith - LinkedIn ghostwriting through a writer/critic refinement loop
// Library exports

pub mod cli;
pub mod config;
pub mod logging;
pub mod profile;
pub mod providers;
pub mod refinement;
pub mod roles;
pub mod store;
