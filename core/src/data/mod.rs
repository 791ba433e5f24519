pub mod codec;
pub mod fingerprint;
pub mod measurement;
pub mod position;

pub use codec::{
    decode_fingerprint, encode_fingerprint, encode_generation, FingerprintRecord,
    GenerationRecord,
};
pub use fingerprint::Fingerprint;
pub use measurement::{Measurement, Reading};
pub use position::{Orientation, Position};
