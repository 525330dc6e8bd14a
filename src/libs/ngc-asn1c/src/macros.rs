/// Declare an ASN.1 ENUMERATED type together with its APER codec.
///
/// The constraint covers the root values; extension values are listed
/// with their absolute index and encoded through the extension bit.
#[macro_export]
macro_rules! aper_enumerated {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($constraint:expr) {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub const CONSTRAINT: $crate::per::Constraint = $constraint;
        }

        impl TryFrom<i64> for $name {
            type Error = $crate::per::PerError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                match value {
                    $(v if v == $value => Ok($name::$variant),)+
                    _ => Err($crate::per::PerError::DecodeError(format!(
                        concat!("Unknown ", stringify!($name), " value: {}"),
                        value
                    ))),
                }
            }
        }

        impl $crate::per::AperEncode for $name {
            fn encode_aper(&self, encoder: &mut $crate::per::AperEncoder) -> $crate::per::PerResult<()> {
                encoder.encode_enumerated(*self as i64, &Self::CONSTRAINT)
            }
        }

        impl $crate::per::AperDecode for $name {
            fn decode_aper(decoder: &mut $crate::per::AperDecoder) -> $crate::per::PerResult<Self> {
                let value = decoder.decode_enumerated(&Self::CONSTRAINT)?;
                Self::try_from(value)
            }
        }
    };
}
