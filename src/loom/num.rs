use bytemuck::Pod;
use derive_more::Display;
use half::f16;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataType {
    F32,
    F16,
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::F32,
        DataType::F16,
        DataType::U8,
        DataType::U16,
        DataType::U32,
        DataType::I8,
        DataType::I16,
        DataType::I32,
    ];

    /// Returns the size of one element of this data type in bytes.
    pub const fn size(self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::F16 => 2,
            DataType::U8 => 1,
            DataType::U16 => 2,
            DataType::U32 => 4,
            DataType::I8 => 1,
            DataType::I16 => 2,
            DataType::I32 => 4,
        }
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F16)
    }
}

pub trait Zero {
    fn zero() -> Self;
}

pub trait One {
    fn one() -> Self;
}

/// An element type a tensor can hold.
pub trait Scalar:
    Sized + Pod + Zero + One + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    const DATA_TYPE: DataType;

    /// Converts a border constant into this type. Integers saturate.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_scalar {
    ($ty:ty, $data_type:ident, $zero:expr, $one:expr, |$value:ident| $convert:expr) => {
        impl Zero for $ty {
            #[inline]
            fn zero() -> Self {
                $zero
            }
        }

        impl One for $ty {
            #[inline]
            fn one() -> Self {
                $one
            }
        }

        impl Scalar for $ty {
            const DATA_TYPE: DataType = DataType::$data_type;

            #[inline]
            fn from_f64($value: f64) -> Self {
                $convert
            }
        }
    };
}

impl_scalar!(f32, F32, 0.0, 1.0, |value| value as f32);
impl_scalar!(f16, F16, f16::ZERO, f16::ONE, |value| f16::from_f64(value));
impl_scalar!(u8, U8, 0, 1, |value| value as u8);
impl_scalar!(u16, U16, 0, 1, |value| value as u16);
impl_scalar!(u32, U32, 0, 1, |value| value as u32);
impl_scalar!(i8, I8, 0, 1, |value| value as i8);
impl_scalar!(i16, I16, 0, 1, |value| value as i16);
impl_scalar!(i32, I32, 0, 1, |value| value as i32);
