pub mod carts;
pub mod products;
pub mod realtime;
pub mod response;
pub mod sessions;
pub mod tickets;
pub mod users;
