pub mod alloc;
pub mod bitmap;
pub mod object_pool;
