pub mod profile;
pub mod propagation;
