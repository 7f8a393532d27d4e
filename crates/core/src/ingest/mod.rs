pub mod naver;
pub mod provider;
pub mod toss;
pub mod types;
