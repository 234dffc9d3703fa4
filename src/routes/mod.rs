//! Route modules for the Lectio server

pub mod annotations;
pub mod books;
pub mod health;
pub mod readings;
