pub mod buffers;
pub mod pipeline;
