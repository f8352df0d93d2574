pub mod pool;
pub mod state;
