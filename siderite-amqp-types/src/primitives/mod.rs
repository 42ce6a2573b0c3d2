//! Definition of the primitive field types
//!
//! These are the building blocks of method arguments and field tables:
//! length-prefixed strings, the scaled decimal, the POSIX timestamp, the
//! tagged [`FieldValue`] union and the [`FieldArray`] / [`FieldTable`]
//! containers.

mod array;
mod decimal;
mod string;
mod table;
mod timestamp;
mod value;

pub use self::array::FieldArray;
pub use self::decimal::Decimal;
pub use self::string::{LongStr, ShortStr};
pub use self::table::FieldTable;
pub use self::timestamp::Timestamp;
pub use self::value::FieldValue;
