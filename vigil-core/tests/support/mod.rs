#![allow(dead_code)]

pub mod constants;
pub mod fakes;
