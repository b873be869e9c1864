use std::alloc::{Layout, alloc, dealloc};
use std::ffi::CStr;
use std::mem;
use std::os::raw::c_char;
use std::slice;

use crate::ZipBuilder;

/// Create an empty archive builder, free it with `packzip_builder_free`
#[unsafe(no_mangle)]
pub extern "C" fn packzip_builder_new() -> *mut ZipBuilder {
    Box::into_raw(Box::new(ZipBuilder::new()))
}

/// Adds a new entry, the name should be NUL terminated, the data can contain NUL characters since
/// the length is provided
#[unsafe(no_mangle)]
pub unsafe extern "C" fn packzip_builder_add(
    ctx: *mut ZipBuilder,
    name: *const c_char,
    data: *const u8,
    data_len: usize,
) -> bool {
    if ctx.is_null() || name.is_null() || (data.is_null() && data_len > 0) {
        return false;
    }

    unsafe {
        let name_str = match CStr::from_ptr(name).to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };

        let data_slice = if data_len == 0 {
            &[][..]
        } else {
            slice::from_raw_parts(data, data_len)
        };
        let b = &mut (*ctx);
        b.add(name_str, data_slice);
        true
    }
}

/// Get the number of entries added so far
#[unsafe(no_mangle)]
pub unsafe extern "C" fn packzip_builder_len(ctx: *const ZipBuilder) -> usize {
    if ctx.is_null() {
        return 0;
    }
    unsafe { (*ctx).len() }
}

/// Assemble the archive, returns a pointer that should be freed with `packzip_free_buffer`, or
/// NULL if the entries cannot form a valid archive
#[unsafe(no_mangle)]
pub unsafe extern "C" fn packzip_builder_finish(
    ctx: *const ZipBuilder,
    out_len: *mut usize,
) -> *mut u8 {
    if ctx.is_null() {
        return std::ptr::null_mut();
    }

    let b = unsafe { &*ctx };
    match b.finish() {
        Ok(assembled) => unsafe { wrap_in_ffi_header(&assembled.bytes, out_len) },
        Err(_) => std::ptr::null_mut(),
    }
}

/// Free a builder
#[unsafe(no_mangle)]
pub unsafe extern "C" fn packzip_builder_free(ctx: *mut ZipBuilder) {
    if ctx.is_null() {
        return;
    }
    unsafe { drop(Box::from_raw(ctx)) }
}

/// CRC-32 of a buffer, as stored in the archive records
#[unsafe(no_mangle)]
pub unsafe extern "C" fn packzip_crc32(data: *const u8, data_len: usize) -> u32 {
    if data.is_null() || data_len == 0 {
        return crate::checksum(&[]);
    }
    let data_slice = unsafe { slice::from_raw_parts(data, data_len) };
    crate::checksum(data_slice)
}

// The length is stored in a hidden `usize` just before the returned pointer so
// `packzip_free_buffer` can rebuild the layout.
unsafe fn wrap_in_ffi_header(data: &[u8], out_len: *mut usize) -> *mut u8 {
    unsafe {
        let len = data.len();
        if !out_len.is_null() {
            *out_len = len;
        }

        let size_of_header = mem::size_of::<usize>();
        let layout = match Layout::from_size_align(size_of_header + len, mem::align_of::<usize>())
        {
            Ok(layout) => layout,
            Err(_) => return std::ptr::null_mut(),
        };

        let raw_ptr = alloc(layout);
        if raw_ptr.is_null() {
            return std::ptr::null_mut();
        }

        *(raw_ptr as *mut usize) = len;

        let data_ptr = raw_ptr.add(size_of_header);
        std::ptr::copy_nonoverlapping(data.as_ptr(), data_ptr, len);

        data_ptr
    }
}

/// Used to free the results from `packzip_builder_finish`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn packzip_free_buffer(ptr: *mut u8) {
    unsafe {
        if ptr.is_null() {
            return;
        }

        let size_of_header = mem::size_of::<usize>();
        let raw_ptr = ptr.sub(size_of_header);
        let len = *(raw_ptr as *const usize);

        // Same layout as in `wrap_in_ffi_header`, which already validated it
        let layout =
            Layout::from_size_align_unchecked(size_of_header + len, mem::align_of::<usize>());
        dealloc(raw_ptr, layout);
    }
}
