pub mod company;
pub mod market;
pub mod recommendation;
pub mod sentiment;
