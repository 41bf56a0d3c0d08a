// Round naming and slot arithmetic for single-elimination trees.

/// Qualification slots of bracket `k` live at `QUAL_SLOT_OFFSET * (k + 1) + local`.
pub const QUAL_SLOT_OFFSET: u32 = 1000;

/// The slot paired with `slot` in its first-round match.
pub fn round_one_opponent(slot: u32) -> u32 {
    if slot % 2 == 1 {
        slot + 1
    } else {
        slot - 1
    }
}

/// `(top, bottom)` slots of the round-1 pair containing `slot`.
pub fn pair_of(slot: u32) -> (u32, u32) {
    let top = if slot % 2 == 1 { slot } else { slot - 1 };
    (top, top + 1)
}

/// All `(top, bottom)` pairs of a round with `round_size` local slots.
pub fn round_pairs(round_size: u32) -> Vec<(u32, u32)> {
    (1..=round_size / 2).map(|i| (2 * i - 1, 2 * i)).collect()
}

/// Where the winner of the match starting at local slot `slot_top` goes
/// next: the local slot in the following round and whether it is the top
/// side of that match.
pub fn advance_slot(slot_top: u32) -> (u32, bool) {
    let next = slot_top.div_ceil(2);
    (next, next % 2 == 1)
}

/// Display name of a main-draw round with `round_size` slots.
pub fn main_draw_round_name(round_size: u32) -> String {
    match round_size {
        2 => "F".to_string(),
        4 => "SF".to_string(),
        8 => "QF".to_string(),
        n => format!("R{n}"),
    }
}

/// Display name of the `index`-th (1-based) qualifying round.
pub fn qualifying_round_name(index: u32) -> String {
    format!("Q{index}")
}

/// Bracket-offset a local qualification slot.
pub fn qual_slot(bracket: usize, local: u32) -> u32 {
    QUAL_SLOT_OFFSET * (bracket as u32 + 1) + local
}

/// Split a stored slot into `(bracket group, local slot)`. Main-draw slots
/// are group 0; qualification bracket `k` is group `k + 1`.
pub fn split_slot(slot: u32) -> (u32, u32) {
    (slot / QUAL_SLOT_OFFSET, slot % QUAL_SLOT_OFFSET)
}

/// Rebuild a stored slot from its group and local slot.
pub fn join_slot(group: u32, local: u32) -> u32 {
    group * QUAL_SLOT_OFFSET + local
}
