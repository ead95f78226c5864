// src/models/mod.rs

pub mod attempt;
pub mod classroom;
pub mod question;
pub mod quiz;
pub mod user;
