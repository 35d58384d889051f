pub mod capture;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod module;
pub mod monitor;
pub mod nfq_message;
pub mod packet;
pub mod packet_queue;
pub mod pipeline;

pub use error::Error;
pub use packet::{Direction, PacketNode};
pub use packet_queue::{NodeId, PacketQueue};
pub use pipeline::{Lifecycle, Pipeline};
