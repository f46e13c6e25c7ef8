//! Deep copy of constraint definitions into a single owned block.
//!
//! The extra runtime area and all strings of all definitions are packed into
//! one allocation through [`DataBank`]s: runtime data from the front, strings
//! from the back. The copied definitions refer to that allocation only, so
//! dropping the collocated set releases every string at once.

use std::cell::RefCell;
use std::mem::size_of;
use std::ops::{Deref, DerefMut, Range};
use std::rc::Rc;

use bytes::{Bytes, BytesMut};

use super::ConstraintDef;
use crate::data_bank::{BoundBank, DataBank};

/// Rounds `size` up to a multiple of 8.
pub(crate) fn align8(size: usize) -> usize {
    (size + 7) & !7
}

/// Byte layout of a collocated block: `count` records of `object_size`,
/// then `additional_size` bytes of extra data, then the string region.
///
/// Records are kept in their own slice; the extra area and the string region
/// share one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    count: usize,
    object_size: usize,
    additional_size: usize,
    strings_size: usize,
}

impl BlockLayout {
    /// Computes a layout. `additional_size` is rounded up to a multiple of 8.
    ///
    /// # Panics
    /// Panics if `object_size` is not a multiple of 8.
    pub fn new(
        count: usize,
        object_size: usize,
        additional_size: usize,
        strings_size: usize,
    ) -> Self {
        assert!(
            object_size % 8 == 0,
            "object_size {} must be a multiple of 8",
            object_size
        );
        Self {
            count,
            object_size,
            additional_size: align8(additional_size),
            strings_size,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn object_size(&self) -> usize {
        self.object_size
    }

    pub fn additional_size(&self) -> usize {
        self.additional_size
    }

    pub fn strings_size(&self) -> usize {
        self.strings_size
    }

    /// Offset of the `index`-th record.
    pub fn record_offset(&self, index: usize) -> usize {
        self.object_size * index
    }

    /// Offset of the extra data area.
    pub fn additional_offset(&self) -> usize {
        self.object_size * self.count
    }

    /// Offset of the string region.
    pub fn strings_offset(&self) -> usize {
        self.additional_offset() + self.additional_size
    }

    /// Total block size.
    pub fn total_size(&self) -> usize {
        self.strings_offset() + self.strings_size
    }
}

/// Extra runtime area of a collocated block, shared by the records that
/// took slots in it.
#[derive(Debug, Clone, Default)]
pub struct RuntimeArea(Rc<RefCell<BytesMut>>);

impl RuntimeArea {
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the whole area.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.borrow().to_vec()
    }

    /// Whether both handles refer to the same area.
    pub fn ptr_eq(&self, other: &RuntimeArea) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A sub-range of a [`RuntimeArea`] owned by one record.
#[derive(Debug, Clone)]
pub struct RuntimeSlot {
    area: RuntimeArea,
    range: Range<usize>,
}

impl RuntimeSlot {
    /// Offset range inside the extra area.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn area(&self) -> &RuntimeArea {
        &self.area
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.area.0.borrow()[self.range.clone()])
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.area.0.borrow_mut()[self.range.clone()])
    }
}

/// Hands out slots of the extra area while records are built.
pub struct RuntimeAlloc<'a, 'b> {
    bank: &'a mut BoundBank<'b>,
    area: &'a RuntimeArea,
}

impl RuntimeAlloc<'_, '_> {
    /// Takes the next `size` bytes of the extra area.
    ///
    /// # Panics
    /// Panics if the records take more than `additional_size` bytes.
    pub fn alloc(&mut self, size: usize) -> RuntimeSlot {
        RuntimeSlot {
            area: self.area.clone(),
            range: self.bank.alloc_data(size),
        }
    }
}

/// Records collocated with their strings and runtime data.
#[derive(Debug)]
pub struct Collocated<T> {
    records: Box<[T]>,
    runtime: RuntimeArea,
    strings: Bytes,
    layout: BlockLayout,
}

impl<T> Collocated<T> {
    /// Layout of the block the records occupy.
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// The extra runtime area.
    pub fn runtime(&self) -> &RuntimeArea {
        &self.runtime
    }

    /// The shared string region.
    pub fn strings(&self) -> &Bytes {
        &self.strings
    }

    /// Whether `bytes` lies inside the string region of this block.
    pub fn owns(&self, bytes: &[u8]) -> bool {
        let region = self.strings.as_ptr_range();
        let range = bytes.as_ptr_range();
        region.start <= range.start && range.end <= region.end
    }
}

impl<T> Deref for Collocated<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl<T> DerefMut for Collocated<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.records
    }
}

/// Deep-copies `defs` into one block. Returns `None` for an empty input.
pub fn collocate(defs: &[ConstraintDef]) -> Option<Collocated<ConstraintDef>> {
    collocate_raw(defs, 0, |def, _| def)
}

/// Deep-copies `defs` into one block and wraps each copy with `make`.
///
/// Records are laid out at a stride of `size_of::<T>()` rounded up to 8,
/// followed by `additional_size` bytes (rounded up to 8) of runtime data
/// that `make` takes slots of. Returns `None` for an empty input.
///
/// # Panics
/// Panics if `make` takes more or fewer than `additional_size` bytes.
pub fn collocate_raw<T>(
    defs: &[ConstraintDef],
    additional_size: usize,
    mut make: impl FnMut(ConstraintDef, &mut RuntimeAlloc<'_, '_>) -> T,
) -> Option<Collocated<T>> {
    if defs.is_empty() {
        return None;
    }

    let mut str_bank = DataBank::new();
    for def in defs {
        def.for_each_str(|s| str_bank.reserve_str(s.len()));
    }
    let layout = BlockLayout::new(
        defs.len(),
        align8(size_of::<T>()),
        additional_size,
        str_bank.size(),
    );

    let mut extra = BytesMut::zeroed(layout.additional_size() + layout.strings_size());
    let mut strings = extra.split_off(layout.additional_size());
    let mut ranges: Vec<Range<usize>> = Vec::new();
    {
        let mut bound = str_bank.bind(&mut strings);
        for def in defs {
            def.for_each_str(|s| ranges.push(bound.alloc_str(s)));
        }
        bound.finish();
    }
    let strings = strings.freeze();

    let runtime = RuntimeArea::default();
    let mut data_bank = DataBank::new();
    data_bank.reserve_data(additional_size);
    let mut ranges = ranges.into_iter();
    let records: Box<[T]> = {
        let mut bound = data_bank.bind(&mut extra);
        let mut alloc = RuntimeAlloc {
            bank: &mut bound,
            area: &runtime,
        };
        let records = defs
            .iter()
            .map(|def| {
                let copy = def.map_strs(|_| {
                    let range = ranges
                        .next()
                        .expect("string ranges follow definition traversal order");
                    strings.slice(range)
                });
                make(copy, &mut alloc)
            })
            .collect();
        bound.finish();
        records
    };
    *runtime.0.borrow_mut() = extra;

    tracing::debug!(
        "Collocated {} constraint definitions into {} bytes ({} bytes of runtime data, {} bytes of strings)",
        layout.count(),
        layout.total_size(),
        layout.additional_size(),
        layout.strings_size()
    );

    Some(Collocated {
        records,
        runtime,
        strings,
        layout,
    })
}
