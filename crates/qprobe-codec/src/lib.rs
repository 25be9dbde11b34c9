pub mod assemble;
pub mod codec;
pub mod decode;
pub mod identity;
pub mod number;
pub mod resolve;
pub mod value;

pub use assemble::{assemble, AssembleError, Payload};
pub use codec::{CodecWarning, Encoded, FieldCodec, Substitution};
pub use decode::{decode_fields, decode_output, DecodeError};
pub use identity::{
    checksum_matches, contract_identity, decode_identity, encode_identity, identity_body,
    IdentityError, PLACEHOLDER_IDENTITY,
};
pub use number::{NumberError, WideInt};
pub use resolve::{FieldRepair, Resolution, Resolver};
pub use value::FieldValue;
