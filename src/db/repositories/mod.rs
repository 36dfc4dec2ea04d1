pub mod audit;
pub mod order;
pub mod payment;
pub mod product;
pub mod role;
pub mod seller;
pub mod user;
