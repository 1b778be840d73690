pub mod ridge;
