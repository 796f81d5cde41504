pub mod connection;
pub mod constants;
pub mod fsm;
pub mod types;
