#[macro_use]
extern crate derive_more;

mod buffer;
mod codec;
mod errors;
mod framing;
mod io;
pub mod protocol;
pub mod types;

pub use self::buffer::Buffer;
pub use self::codec::{Decode, Encode};
pub use self::errors::{AmqpCodecError, AmqpParseError};
pub use self::framing::{AmqpFrame, Frame, FRAME_OVERHEAD};
pub use self::io::AmqpCodec;
pub use self::protocol::{BasicProperties, ContentHeader, Method, ProtocolHeader};
