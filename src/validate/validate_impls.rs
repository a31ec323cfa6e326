// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use crate::Allocator;
use crate::decode::Error;
use crate::types::*;

use super::{Environment, Validate};

macro_rules! impl_validate_for_idx {
    ($idx_type:ty, $space:path, $count_method:ident) => {
        impl<A: Allocator> Validate<A> for $idx_type {
            fn validate(&self, env: &Environment<A>) -> Result<(), Error> {
                let index: u32 = **self;
                let capacity = env.$count_method();
                if index >= capacity {
                    Err(Error::IndexOutOfBounds {
                        space: $space,
                        index,
                        capacity,
                    })
                } else {
                    Ok(())
                }
            }
        }
    };
}

impl_validate_for_idx!(TypeIdx, IndexSpace::Type, num_sigs);
impl_validate_for_idx!(FuncIdx, IndexSpace::Function, num_funcs);
impl_validate_for_idx!(TableIdx, IndexSpace::Table, num_tables);
impl_validate_for_idx!(MemIdx, IndexSpace::Memory, num_memories);
impl_validate_for_idx!(GlobalIdx, IndexSpace::Global, num_globals);

impl<A: Allocator> Validate<A> for ExportKind {
    fn validate(&self, env: &Environment<A>) -> Result<(), Error> {
        match self {
            ExportKind::Function(idx) => env.validate(idx),
            ExportKind::Table(idx) => env.validate(idx),
            ExportKind::Memory(idx) => env.validate(idx),
            ExportKind::Global(idx) => env.validate(idx),
        }
    }
}

fn validate_limits(limits: Limits, bound: u32) -> Result<(), Error> {
    let too_large = limits.initial > bound || limits.maximum.is_some_and(|max| max > bound);
    let inverted = limits.maximum.is_some_and(|max| max < limits.initial);
    if too_large || inverted {
        Err(Error::InvalidLimits(limits))
    } else {
        Ok(())
    }
}

// Tables only bound their initial size; the maximum is a hint.
pub(crate) fn validate_table_limits(limits: Limits) -> Result<(), Error> {
    validate_limits(
        Limits {
            initial: limits.initial,
            maximum: limits.maximum.map(|max| max.min(MAX_TABLE_ELEMS)),
        },
        MAX_TABLE_ELEMS,
    )
    .map_err(|_| Error::InvalidLimits(limits))
}

pub(crate) fn validate_memory_limits(limits: Limits) -> Result<(), Error> {
    validate_limits(limits, MAX_MEMORY_PAGES)
}

pub(crate) fn validate_start_function<A: Allocator>(
    env: &Environment<A>,
    func: FuncIdx,
) -> Result<(), Error> {
    env.validate(&func)?;
    match env.func_signature(func) {
        Some(sig) if sig.params.is_empty() && sig.result == ResultType::Void => Ok(()),
        _ => Err(Error::InvalidStartFunction(func)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_limits() {
        let limits = |initial, maximum| Limits { initial, maximum };
        assert_eq!(validate_memory_limits(limits(0, None)), Ok(()));
        assert_eq!(validate_memory_limits(limits(1, Some(1))), Ok(()));
        assert_eq!(validate_memory_limits(limits(MAX_MEMORY_PAGES, None)), Ok(()));
        assert_eq!(
            validate_memory_limits(limits(2, Some(1))),
            Err(Error::InvalidLimits(limits(2, Some(1))))
        );
        assert_eq!(
            validate_memory_limits(limits(MAX_MEMORY_PAGES + 1, None)),
            Err(Error::InvalidLimits(limits(MAX_MEMORY_PAGES + 1, None)))
        );
        assert_eq!(
            validate_memory_limits(limits(1, Some(MAX_MEMORY_PAGES + 1))),
            Err(Error::InvalidLimits(limits(1, Some(MAX_MEMORY_PAGES + 1))))
        );
    }

    #[test]
    fn table_limits() {
        let limits = |initial, maximum| Limits { initial, maximum };
        assert_eq!(validate_table_limits(limits(1, Some(u32::MAX))), Ok(()));
        assert_eq!(
            validate_table_limits(limits(MAX_TABLE_ELEMS + 1, None)),
            Err(Error::InvalidLimits(limits(MAX_TABLE_ELEMS + 1, None)))
        );
        assert_eq!(
            validate_table_limits(limits(4, Some(3))),
            Err(Error::InvalidLimits(limits(4, Some(3))))
        );
    }
}
