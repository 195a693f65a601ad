mod ring;

pub use self::ring::{FrameConsumer, FrameProducer, FrameRing};
