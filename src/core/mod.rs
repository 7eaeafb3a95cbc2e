pub mod activity;
pub mod container;
pub mod lifecycle;
pub mod protocol;
pub mod review;
pub mod service;
pub mod store;
pub mod terminal;
pub mod workflow;
