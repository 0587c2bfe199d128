use core::ops::Range;

unsafe extern "C" {
    static __state_start: u32;
    static __state_end: u32;
}

/// Flash offsets of the key/value map holding the clock state and settings.
pub fn get_state_range() -> Range<u32> {
    unsafe {
        let start = &__state_start as *const u32 as u32;
        let end = &__state_end as *const u32 as u32;
        start..end
    }
}
