pub mod modality;
pub mod stabilizer;

pub use modality::GestureModality;
pub use stabilizer::{
    DiscreteEvent, Gesture, GestureSnapshot, GestureStabilizer, SensorFrame, Tracking,
};
