//! AMF0/AMF3 value model and codecs (spec §8 "four structural hooks":
//! number, boolean, string, object/ECMA array). AMF3 is retained in full
//! since `FLEX_MESSAGE`/`FLEX_SHARED_OBJECT` command framing switches to it
//! mid-stream (spec §4.7).

pub mod amf0;
pub mod amf3;
pub mod value;

pub use value::AmfValue;
