//! Lock-free SPSC ring buffer between cue playback and the output callback.
//!
//! `ringbuf::HeapRb<f32>` gives a wait-free `pop_slice` that is safe to call
//! from the real-time output callback.

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, held by whoever enqueues cues.
pub type OutputProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the output callback.
pub type OutputConsumer = ringbuf::HeapCons<f32>;

/// 2^18 = 262 144 mono samples ≈ 5.4 s at 48 kHz. Cues are well under a
/// second, so this only overflows when dozens are fired at once.
pub const OUTPUT_RING_CAPACITY: usize = 1 << 18;

pub fn create_output_ring() -> (OutputProducer, OutputConsumer) {
    HeapRb::<f32>::new(OUTPUT_RING_CAPACITY).split()
}
