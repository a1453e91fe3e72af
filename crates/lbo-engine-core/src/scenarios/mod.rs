pub mod monte_carlo;
pub mod scenario;
pub mod sensitivity;
pub mod tornado;
pub mod variables;
