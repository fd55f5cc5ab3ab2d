#![allow(dead_code)]

pub mod cocoasort_env;
pub mod fakes;
pub mod images;
