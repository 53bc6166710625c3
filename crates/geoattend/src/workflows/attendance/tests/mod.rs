mod common;
mod geometry;
mod service;
