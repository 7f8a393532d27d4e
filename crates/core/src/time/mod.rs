pub mod kst;
