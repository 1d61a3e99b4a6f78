//! Definition normalization.
//!
//! Rewrites the three typed fields of a column family to canonical store
//! identifiers right before submission. Everything else on the definition is
//! left alone.

use crate::translate::{translate_column_type, translate_comparator};
use crate::{ColshiftResult, ColumnFamilyDefinition};

/// Normalize a definition in place and hand it back.
///
/// Fails with `UnrecognizedColumnType` when `column_type` is outside the
/// structural table. Comparator fields never fail.
pub fn normalize(mut cf: ColumnFamilyDefinition) -> ColshiftResult<ColumnFamilyDefinition> {
    normalize_in_place(&mut cf)?;
    Ok(cf)
}

/// In-place variant of [`normalize`]. On error the comparator fields may
/// already be rewritten; the definition must not be submitted.
pub fn normalize_in_place(cf: &mut ColumnFamilyDefinition) -> ColshiftResult<()> {
    cf.comparator_type = cf.comparator_type.as_deref().map(translate_comparator);
    cf.subcomparator_type = cf.subcomparator_type.as_deref().map(translate_comparator);
    cf.column_type = translate_column_type(&cf.column_type)?;
    Ok(())
}
