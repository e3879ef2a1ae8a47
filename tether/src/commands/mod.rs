pub mod eventually;
pub mod wait_bind;
