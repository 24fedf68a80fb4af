pub mod body;
pub mod contact;
pub mod fixture;
pub mod joint;
pub mod listener;
pub mod raycast;
pub(crate) mod solver;
pub mod world;
