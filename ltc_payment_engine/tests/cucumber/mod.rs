mod steps;
mod world;

pub use world::StoreWorld;
