//! Item containers: the capability items expose, the LIFO store they wait in,
//! and the bounded bridge that feeds handler roles.

pub mod bridge;
pub mod item;
pub mod stack;
