pub mod events;
pub mod sites;
pub mod system;
