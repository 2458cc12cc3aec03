/*
 * Memory Layout and Address-Space Queries
 *
 * The core only needs two things from the memory subsystem: the user/kernel
 * boundary test and the per-process page directory that answers "is this
 * user address mapped, and where is its backing memory". Everything else
 * (frame allocation, demand paging, the real MMU) is the embedder's.
 *
 * Addresses follow the classic 32-bit split: user virtual addresses occupy
 * [0, PHYS_BASE); everything at or above PHYS_BASE belongs to the kernel.
 */

pub mod pagedir;

pub use pagedir::PageDir;

/// Size of a virtual page in bytes.
pub const PAGE_SIZE: usize = 4096;
/// log2(PAGE_SIZE).
pub const PAGE_SHIFT: u32 = 12;
/// First kernel virtual address; user addresses are strictly below this.
pub const PHYS_BASE: u32 = 0xC000_0000;

/// Does `vaddr` lie in the user half of the address space?
pub fn is_user_vaddr(vaddr: u32) -> bool {
    vaddr < PHYS_BASE
}

/// Round an address down to the base of its page.
pub fn page_round_down(vaddr: u32) -> u32 {
    vaddr & !(PAGE_SIZE as u32 - 1)
}

/// Byte offset of an address within its page.
pub fn page_offset(vaddr: u32) -> usize {
    (vaddr & (PAGE_SIZE as u32 - 1)) as usize
}
