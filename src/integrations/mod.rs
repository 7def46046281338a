//! Concrete remote gateways

pub mod p115;
