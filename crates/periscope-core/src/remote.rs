//! Remote structure helpers
//!
//! Bounded readers for the engine structures the camera search and the write
//! features walk: pointer lists, object class names and game object
//! component arrays.

use crate::traits::{MemoryAccess, MemoryAccessExt};
use periscope_common::{ComponentOffsets, Error, RemoteAddress, Result};
use tracing::trace;

/// Counts above this are treated as garbage
pub const MAX_LIST_COUNT: usize = 16384;
/// Components inspected per game object
pub const MAX_COMPONENTS: usize = 1024;
/// Longest class name read
pub const MAX_CLASS_NAME_LEN: usize = 128;

/// Header of a remote pointer list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteList {
    pub items: RemoteAddress,
    pub count: usize,
}

impl RemoteList {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Address of entry `index` for entries `stride` bytes apart
    pub fn entry(&self, index: usize, stride: u64) -> RemoteAddress {
        self.items.offset(index as u64 * stride)
    }
}

/// Read a list header: items pointer at `items_offset`, i32 count at `count_offset`
///
/// An invalid items pointer or non-positive count yields an empty list.
pub fn read_list_header(
    mem: &dyn MemoryAccess,
    list: RemoteAddress,
    items_offset: u64,
    count_offset: u64,
) -> Result<RemoteList> {
    let items = mem.read_ptr(list.offset(items_offset), false)?;
    let count = mem.read_value::<i32>(list.offset(count_offset), false)?;
    if !items.is_valid() || count <= 0 {
        return Ok(RemoteList::default());
    }
    let count = count as usize;
    if count > MAX_LIST_COUNT {
        return Err(Error::memory(
            list.get(),
            format!("implausible list count {} (max {})", count, MAX_LIST_COUNT),
        ));
    }
    Ok(RemoteList { items, count })
}

/// Read `count` pointers spaced `stride` bytes apart in one transport read
pub fn read_pointer_array(
    mem: &dyn MemoryAccess,
    items: RemoteAddress,
    count: usize,
    stride: u64,
) -> Result<Vec<RemoteAddress>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let stride = stride as usize;
    let len = (count - 1) * stride + std::mem::size_of::<u64>();
    let bytes = mem.read(items, len, false)?;
    if bytes.len() < len {
        return Err(Error::memory(
            items.get(),
            format!("short read: expected {} bytes, got {}", len, bytes.len()),
        ));
    }
    Ok((0..count)
        .map(|i| {
            let start = i * stride;
            RemoteAddress(bytemuck::pod_read_unaligned(&bytes[start..start + 8]))
        })
        .collect())
}

/// Class name of a script instance, following `chain` to the name string
pub fn read_class_name(
    mem: &dyn MemoryAccess,
    instance: RemoteAddress,
    chain: &[u64],
) -> Result<String> {
    let name_ptr = mem.read_ptr_chain(instance, chain, false)?;
    mem.read_utf8(name_ptr, MAX_CLASS_NAME_LEN, false)
}

/// Find a component on `game_object` whose class name matches `class_name`
/// (ASCII case-insensitive). Returns the component's script instance.
///
/// Entries that fail to read are skipped.
pub fn find_component(
    mem: &dyn MemoryAccess,
    game_object: RemoteAddress,
    class_name: &str,
    offsets: &ComponentOffsets,
) -> Result<Option<RemoteAddress>> {
    let array = mem.read_ptr(game_object.offset(offsets.components_array), false)?;
    if !array.is_valid() {
        return Ok(None);
    }
    let count = mem.read_value::<u64>(game_object.offset(offsets.components_count), false)?;
    let count = (count as usize).min(MAX_COMPONENTS);

    for index in 0..count {
        let entry = array.offset(index as u64 * offsets.entry_stride);
        let instance = match mem
            .read_valid_ptr(entry.offset(offsets.entry_component), false)
            .and_then(|component| {
                mem.read_valid_ptr(component.offset(offsets.component_object_class), false)
            }) {
            Ok(instance) => instance,
            Err(e) => {
                trace!(index, error = %e, "Skipping unreadable component entry");
                continue;
            }
        };
        match read_class_name(mem, instance, &offsets.class_name_chain) {
            Ok(name) if name.eq_ignore_ascii_case(class_name) => return Ok(Some(instance)),
            Ok(_) => {}
            Err(e) => trace!(index, error = %e, "Skipping component without class name"),
        }
    }
    Ok(None)
}
