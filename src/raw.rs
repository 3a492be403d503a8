//! Open-addressing table whose collision chains live in a 4-bit side array.
//!
//! Layout: a power-of-two array of (possibly uninitialized) buckets plus a
//! [`Tails`] array of the same length. A bucket holds a value iff its tail is
//! not EMPTY; there is no sentinel key and no stored hash.
//!
//! Chains are coalesced. An entry sits on the chain running through its home
//! bucket (`hash & bucket_mask`), at or after that bucket, and one chain can
//! carry entries of many homes. A lookup starts at the home bucket and checks
//! every entry up to the end of the chain. No bucket is jumped to from two
//! places, so chains never branch or loop.
//!
//! Below the load limit placement never grows the table. A new entry goes one
//! jump past the end of its chain, or between two members after its home, or
//! past the end of another chain that its own is joined onto. When none of
//! that finds an EMPTY bucket the entries are laid out again at the same size
//! with every chain a run of adjacent buckets, which always succeeds.
//!
//! Entries are passed in with their hash, and the caller supplies a hasher for
//! entries already in the table (needed for removal and relayout) and an
//! equality predicate for lookups, like `hashbrown::HashTable`.

use std::mem::{self, MaybeUninit};

use crate::error::{Error, Result};
use crate::tails::{self, Tails};
use crate::uunwrap::UUnwrap;

/// Smallest bucket array ever allocated.
pub const MIN_BUCKETS: usize = 2;

/// Resize once more than 3/4 of the buckets are occupied.
const LOAD_FACTOR_NUM: usize = 3;
const LOAD_FACTOR_DEN: usize = 4;

/// Code linking a bucket to its right-hand neighbour.
const NEXT_BUCKET: u8 = tails::FIRST_JUMP_CODE;

/// Number of buckets needed to hold `capacity` entries within the load factor.
pub fn buckets_for(capacity: usize) -> usize {
    let needed = capacity
        .checked_mul(LOAD_FACTOR_DEN)
        .map(|n| n.div_ceil(LOAD_FACTOR_NUM))
        .and_then(usize::checked_next_power_of_two);
    match needed {
        Some(buckets) => buckets.max(MIN_BUCKETS),
        None => capacity_overflow(),
    }
}

#[inline(always)]
fn max_items(buckets: usize) -> usize {
    // Split so that huge bucket counts don't overflow.
    buckets / LOAD_FACTOR_DEN * LOAD_FACTOR_NUM
        + buckets % LOAD_FACTOR_DEN * LOAD_FACTOR_NUM / LOAD_FACTOR_DEN
}

#[cold]
#[inline(never)]
fn capacity_overflow() -> ! {
    panic!("compact table capacity overflow")
}

pub struct RawTable<T> {
    buckets: Box<[MaybeUninit<T>]>,
    tails: Tails,

    // Mask to get an index from a hash value. The value is one less than the
    // number of buckets in the table.
    bucket_mask: usize,

    // Number of live entries.
    items: usize,

    // Bumped on every structural change; checked by cursors.
    version: u64,
}

/// Summary of chain lengths, see [`RawTable::probe_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbeStats {
    pub entries: usize,
    pub buckets: usize,
    pub chains: usize,
    pub longest_chain: usize,
    /// Mean number of buckets visited by a successful lookup.
    pub avg_probe_length: f64,
}

impl ProbeStats {
    pub fn print(&self) {
        println!("  load: {}/{}", self.entries, self.buckets);
        println!("  chains: {}", self.chains);
        println!("  longest_chain: {}", self.longest_chain);
        println!("  avg_probe_length: {:.3}", self.avg_probe_length);
    }
}

/// The members of a chain from some bucket to its end, and for each one the
/// position of its home bucket in `buckets`. `None` means the home comes
/// before the first bucket listed.
struct ChainWalk {
    buckets: Vec<usize>,
    homes: Vec<Option<usize>>,
}

impl<T> RawTable<T> {
    pub fn new() -> Self {
        Self::with_buckets(MIN_BUCKETS)
    }

    /// Creates a table that holds `capacity` entries without resizing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_buckets(buckets_for(capacity))
    }

    /// `buckets` must be a power of two.
    pub(crate) fn with_buckets(buckets: usize) -> Self {
        debug_assert!(buckets.is_power_of_two());
        Self {
            buckets: Box::new_uninit_slice(buckets),
            tails: Tails::new(buckets),
            bucket_mask: buckets - 1,
            items: 0,
            version: 0,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.items
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    /// Number of entries the table holds before it has to grow.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        max_items(self.bucket_count())
    }

    #[inline(always)]
    pub fn bucket_count(&self) -> usize {
        self.bucket_mask + 1
    }

    #[inline(always)]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn tails(&self) -> &Tails {
        &self.tails
    }

    #[inline(always)]
    fn home(&self, hash: u64) -> usize {
        hash as usize & self.bucket_mask
    }

    #[inline(always)]
    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Safety: bucket `index` is occupied.
    #[inline(always)]
    unsafe fn bucket(&self, index: usize) -> &T {
        unsafe { self.buckets.get_unchecked(index).assume_init_ref() }
    }

    /// Safety: bucket `index` is occupied.
    #[inline(always)]
    unsafe fn bucket_mut(&mut self, index: usize) -> &mut T {
        unsafe { self.buckets.get_unchecked_mut(index).assume_init_mut() }
    }

    /// Moves the value out; the caller must mark the tail EMPTY or refill it.
    ///
    /// Safety: bucket `index` is occupied.
    #[inline(always)]
    unsafe fn read(&mut self, index: usize) -> T {
        unsafe { self.buckets.get_unchecked(index).assume_init_read() }
    }

    /// Safety: bucket `index` is EMPTY (or was just read out).
    #[inline(always)]
    unsafe fn write(&mut self, index: usize, value: T) {
        unsafe {
            self.buckets.get_unchecked_mut(index).write(value);
        }
    }

    /// Entry at `index`, if the bucket is occupied.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index > self.bucket_mask || self.tails.is_empty(index) {
            return None;
        }
        // Safety: occupied, checked above.
        Some(unsafe { self.bucket(index) })
    }

    /// Entry at `index`, if the bucket is occupied.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index > self.bucket_mask || self.tails.is_empty(index) {
            return None;
        }
        // Safety: occupied, checked above.
        Some(unsafe { self.bucket_mut(index) })
    }

    /// Bucket index of the entry matching `eq` on the chain through the home
    /// bucket of `hash`.
    #[inline]
    pub fn find(&self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<usize> {
        let mask = self.bucket_mask;
        let mut index = self.home(hash);
        if self.tails.is_empty(index) {
            return None;
        }
        loop {
            // Safety: chain members are occupied.
            if eq(unsafe { self.bucket(index) }) {
                return Some(index);
            }
            if !self.tails.try_continue_with_tail(&mut index, mask) {
                return None;
            }
        }
    }

    /// Last member of the chain through `index`.
    #[inline]
    fn chain_end(&self, mut index: usize) -> usize {
        while self.tails.try_continue_with_tail(&mut index, self.bucket_mask) {}
        index
    }

    /// Inserts an entry whose key is known not to be in the table, growing
    /// the table first if it is at its load limit. Returns the entry's bucket.
    pub fn insert_unique(&mut self, hash: u64, value: T, hasher: impl Fn(&T) -> u64) -> usize {
        if self.items >= self.capacity() {
            let buckets = buckets_for(self.items + 1).max(self.bucket_count() * 2);
            self.resize(buckets, &hasher);
        }
        let index = match self.place(hash, value) {
            Ok(index) => index,
            Err(value) => self.relayout_with(hash, value, &hasher),
        };
        self.bump_version();
        index
    }

    /// Puts `value` into an EMPTY bucket reachable from its home and returns
    /// that bucket. Gives the value back if there is none. Chains may have
    /// been joined by then, which leaves every entry reachable.
    fn place(&mut self, hash: u64, value: T) -> std::result::Result<usize, T> {
        let mask = self.bucket_mask;
        let home = self.home(hash);

        if self.tails.is_empty(home) {
            // Safety: EMPTY.
            unsafe { self.write(home, value) };
            self.tails.set_solo(home);
            self.items += 1;
            return Ok(home);
        }

        let mut tail = self.chain_end(home);
        if let Some((code, index)) = self.reachable_empty(tail) {
            self.link_after(tail, code, index, value);
            return Ok(index);
        }

        // Between two members at or after the home bucket.
        let mut member = home;
        let mut next = home;
        while self.tails.try_continue_with_tail(&mut next, mask) {
            if let Some((code, index, onward)) = self.empty_between(member, next) {
                self.link_after(member, code, index, value);
                self.tails.set_jump(index, onward);
                return Ok(index);
            }
            member = next;
        }

        // Past the end of a chain that nothing jumps into yet.
        while let Some((code, end)) = self.reachable_chain_start(tail) {
            self.tails.set_jump(tail, code);
            tail = end;
            if let Some((code, index)) = self.reachable_empty(tail) {
                self.link_after(tail, code, index, value);
                return Ok(index);
            }
        }
        Err(value)
    }

    /// Writes `value` into the EMPTY bucket `index` as a chain end and makes
    /// `from` jump to it.
    #[inline]
    fn link_after(&mut self, from: usize, code: u8, index: usize, value: T) {
        // Safety: callers pass an EMPTY bucket.
        unsafe { self.write(index, value) };
        self.tails.set_solo(index);
        self.tails.set_jump(from, code);
        self.items += 1;
    }

    /// First EMPTY bucket one jump away from `from`, in code order.
    #[inline]
    fn reachable_empty(&self, from: usize) -> Option<(u8, usize)> {
        tails::jump_codes()
            .map(|(code, distance)| (code, (from + distance) & self.bucket_mask))
            .find(|&(_, index)| self.tails.is_empty(index))
    }

    /// An EMPTY bucket one jump after `from` that can itself jump to `to`.
    /// Returns the code into it, the bucket and the code out of it.
    fn empty_between(&self, from: usize, to: usize) -> Option<(u8, usize, u8)> {
        let mask = self.bucket_mask;
        tails::jump_codes().find_map(|(code, distance)| {
            let index = (from + distance) & mask;
            if !self.tails.is_empty(index) {
                return None;
            }
            let onward = tails::code_for_offset(to.wrapping_sub(index), mask)?;
            Some((code, index, onward))
        })
    }

    /// The first bucket of another chain one jump away from `tail`, as the
    /// code reaching it and the end of that chain.
    fn reachable_chain_start(&self, tail: usize) -> Option<(u8, usize)> {
        let mask = self.bucket_mask;
        tails::jump_codes().find_map(|(code, distance)| {
            let start = (tail + distance) & mask;
            if start == tail
                || self.tails.is_empty(start)
                || self.tails.predecessor(start, mask).is_some()
            {
                return None;
            }
            // The start of `tail`'s own chain leads back to `tail`.
            let end = self.chain_end(start);
            (end != tail).then_some((code, end))
        })
    }

    /// Lays every entry out again at the current size, `value` included, and
    /// returns `value`'s bucket.
    #[cold]
    #[inline(never)]
    fn relayout_with<H: Fn(&T) -> u64>(&mut self, hash: u64, value: T, hasher: &H) -> usize {
        log::debug!(
            "no bucket reachable from chain {} at {}/{}; laying out again",
            self.home(hash),
            self.items,
            self.bucket_count()
        );
        let entries = self.take_all(hasher);
        self.reset_storage(self.bucket_count());
        // Entries never move once placed in runs.
        let index = self.place_in_run(hash, value);
        for (hash, value) in entries {
            self.place_in_run(hash, value);
        }
        index
    }

    /// Places `value` in a table where every chain is a run of adjacent
    /// buckets linked by single steps, and keeps it that way: the entry goes
    /// into its home bucket or right after the run covering it, and runs that
    /// come to touch are linked into one. At least one bucket must stay EMPTY.
    fn place_in_run(&mut self, hash: u64, value: T) -> usize {
        let mask = self.bucket_mask;
        let home = self.home(hash);
        let index = if self.tails.is_empty(home) {
            let before = home.wrapping_sub(1) & mask;
            if !self.tails.is_empty(before) {
                self.tails.set_jump(before, NEXT_BUCKET);
            }
            home
        } else {
            let end = self.chain_end(home);
            self.tails.set_jump(end, NEXT_BUCKET);
            (end + 1) & mask
        };
        debug_assert!(self.tails.is_empty(index), "run ends next to occupied bucket {index}");

        // Safety: one past the end of a run, so EMPTY.
        unsafe { self.write(index, value) };
        if self.tails.is_empty((index + 1) & mask) {
            self.tails.set_solo(index);
        } else {
            self.tails.set_jump(index, NEXT_BUCKET);
        }
        self.items += 1;
        index
    }

    /// Hashes of all occupied buckets, in bucket order.
    fn occupied_hashes<H: Fn(&T) -> u64>(&self, hasher: &H) -> Vec<(usize, u64)> {
        (0..self.bucket_count())
            .filter(|&index| !self.tails.is_empty(index))
            // Safety: occupied.
            .map(|index| (index, hasher(unsafe { self.bucket(index) })))
            .collect()
    }

    /// Moves the given buckets' entries out and marks them EMPTY. Hashes are
    /// computed up front by the callers, so no user code runs while the
    /// chains are half taken apart.
    fn move_out(&mut self, members: Vec<(usize, u64)>) -> Vec<(u64, T)> {
        let mut out = Vec::with_capacity(members.len());
        for (index, hash) in members {
            // Safety: occupied; marked EMPTY right after.
            let value = unsafe { self.read(index) };
            self.tails.set_empty(index);
            self.items -= 1;
            out.push((hash, value));
        }
        out
    }

    /// Walks the chain from `first` to its end, hashing every member.
    fn chain_from<H: Fn(&T) -> u64>(&self, first: usize, hasher: &H) -> ChainWalk {
        let mut buckets = vec![first];
        let mut index = first;
        while self.tails.try_continue_with_tail(&mut index, self.bucket_mask) {
            buckets.push(index);
        }
        let position: hashbrown::HashMap<usize, usize> =
            buckets.iter().enumerate().map(|(at, &index)| (index, at)).collect();
        let homes = buckets
            .iter()
            .enumerate()
            .map(|(at, &index)| {
                // Safety: chain members are occupied.
                let home = self.home(hasher(unsafe { self.bucket(index) }));
                position.get(&home).copied().filter(|&home_at| home_at <= at)
            })
            .collect();
        ChainWalk { buckets, homes }
    }

    /// Removes and returns the entry matching `eq` on the chain through the
    /// home bucket of `hash`.
    pub fn remove(
        &mut self,
        hash: u64,
        mut eq: impl FnMut(&T) -> bool,
        hasher: impl Fn(&T) -> u64,
    ) -> Option<T> {
        let mask = self.bucket_mask;
        let mut index = self.home(hash);
        if self.tails.is_empty(index) {
            return None;
        }
        let mut prev = None;
        loop {
            // Safety: chain members are occupied.
            if eq(unsafe { self.bucket(index) }) {
                break;
            }
            prev = Some(index);
            if !self.tails.try_continue_with_tail(&mut index, mask) {
                return None;
            }
        }
        Some(self.remove_at(prev, index, &hasher))
    }

    /// Unlinks the entry at `index`. `prev` is its chain predecessor if the
    /// caller walked past it.
    fn remove_at<H: Fn(&T) -> u64>(&mut self, prev: Option<usize>, index: usize, hasher: &H) -> T {
        // Hash first: nothing below runs user code.
        let chain = self.chain_from(index, hasher);
        let prev = prev.or_else(|| self.tails.predecessor(index, self.bucket_mask));

        // Safety: found by walking its chain; `close_gap` refills the bucket
        // or marks it EMPTY.
        let value = unsafe { self.read(index) };
        self.items -= 1;
        self.bump_version();
        self.close_gap(prev, chain);
        value
    }

    /// Closes the gap at the first bucket of `chain`, whose entry was read out.
    ///
    /// If no later entry has its home there, the gap is spliced out, or the
    /// chain is cut at the gap when every later entry's home lies after it.
    /// Otherwise the last entry homed at or before the gap moves in, and its
    /// old bucket becomes the gap.
    fn close_gap(&mut self, mut prev: Option<usize>, chain: ChainWalk) {
        let mask = self.bucket_mask;
        let ChainWalk { buckets, homes } = chain;
        let mut gap = 0;
        loop {
            let at = buckets[gap];
            let later = gap + 1..buckets.len();
            let homed_here = later.clone().any(|j| homes[j] == Some(gap));
            let movable = later.rev().find(|&j| homes[j].is_none_or(|home| home <= gap));

            if !homed_here {
                match (prev, buckets.get(gap + 1)) {
                    (prev, None) => {
                        if let Some(prev) = prev {
                            self.tails.set_solo(prev);
                        }
                        self.tails.set_empty(at);
                        return;
                    }
                    (Some(prev), Some(&next)) => {
                        if let Some(code) = tails::code_for_offset(next.wrapping_sub(prev), mask) {
                            self.tails.set_jump(prev, code);
                            self.tails.set_empty(at);
                            return;
                        }
                    }
                    (None, Some(_)) => {}
                }
                if movable.is_none() {
                    // The rest of the chain holds only its own homes.
                    if let Some(prev) = prev {
                        self.tails.set_solo(prev);
                    }
                    self.tails.set_empty(at);
                    return;
                }
            }

            let from = movable.uunwrap();
            // Safety: `from` is an occupied chain member; `at` was read out.
            // `at` keeps its code, so the chain shape is unchanged.
            unsafe {
                let moved = self.read(buckets[from]);
                self.write(at, moved);
            }
            prev = Some(buckets[from - 1]);
            gap = from;
        }
    }

    /// Drops every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.drop_entries();
        self.tails.reset();
        self.items = 0;
        self.bump_version();
    }

    fn drop_entries(&mut self) {
        if mem::needs_drop::<T>() && self.items > 0 {
            for index in 0..self.bucket_count() {
                if !self.tails.is_empty(index) {
                    // Safety: occupied.
                    unsafe { self.buckets.get_unchecked_mut(index).assume_init_drop() };
                }
            }
        }
    }

    /// Makes room for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize, hasher: impl Fn(&T) -> u64) {
        let needed = match self.items.checked_add(additional) {
            Some(needed) => needed,
            None => capacity_overflow(),
        };
        if needed > self.capacity() {
            self.resize(buckets_for(needed), &hasher);
            self.bump_version();
        }
    }

    /// Shrinks the bucket array as far as the load factor allows.
    pub fn shrink_to_fit(&mut self, hasher: impl Fn(&T) -> u64) {
        let target = buckets_for(self.items);
        if target < self.bucket_count() {
            self.resize(target, &hasher);
            self.bump_version();
        }
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&mut T) -> bool, hasher: impl Fn(&T) -> u64) {
        // Decide first, mutate after: a panicking `keep` leaves the table intact.
        let mut rejected = Vec::new();
        for index in 0..self.bucket_count() {
            if self.tails.is_empty(index) {
                continue;
            }
            // Safety: occupied.
            if !keep(unsafe { self.bucket_mut(index) }) {
                rejected.push(index);
            }
        }
        if rejected.is_empty() {
            return;
        }

        let members = self.occupied_hashes(&hasher);
        let indices: Vec<usize> = members.iter().map(|&(index, _)| index).collect();
        let mut skip = rejected.iter().peekable();
        let mut kept = Vec::with_capacity(members.len() - rejected.len());
        let mut discarded = Vec::with_capacity(rejected.len());
        for (index, entry) in indices.into_iter().zip(self.move_out(members)) {
            if skip.next_if_eq(&&index).is_some() {
                discarded.push(entry);
            } else {
                kept.push(entry);
            }
        }
        let buckets = self.bucket_count();
        self.rebuild(buckets, kept);
        self.bump_version();
        // Destructors run once the table is whole again.
        drop(discarded);
    }

    /// Moves every entry into a fresh array of `buckets` buckets.
    fn resize<H: Fn(&T) -> u64>(&mut self, buckets: usize, hasher: &H) {
        let old_buckets = self.bucket_count();
        let entries = self.take_all(hasher);
        self.rebuild(buckets, entries);
        log::trace!(
            "rehashed {} entries: {} -> {} buckets",
            self.items,
            old_buckets,
            self.bucket_count()
        );
    }

    /// Moves every live entry out, leaving the table empty.
    fn take_all<H: Fn(&T) -> u64>(&mut self, hasher: &H) -> Vec<(u64, T)> {
        let members = self.occupied_hashes(hasher);
        let entries = self.move_out(members);
        debug_assert_eq!(self.items, 0);
        entries
    }

    fn reset_storage(&mut self, buckets: usize) {
        debug_assert_eq!(self.items, 0);
        self.buckets = Box::new_uninit_slice(buckets);
        self.tails = Tails::new(buckets);
        self.bucket_mask = buckets - 1;
    }

    /// Replaces the (empty) storage with `buckets` buckets holding `entries`.
    fn rebuild(&mut self, buckets: usize, entries: Vec<(u64, T)>) {
        debug_assert!(entries.len() <= max_items(buckets));
        self.reset_storage(buckets);
        for (hash, value) in entries {
            self.place_in_run(hash, value);
        }
    }

    /// Chain length statistics. Walks every chain once.
    pub fn probe_stats(&self, hasher: impl Fn(&T) -> u64) -> ProbeStats {
        let mask = self.bucket_mask;
        let mut stats = ProbeStats {
            entries: self.items,
            buckets: self.bucket_count(),
            ..ProbeStats::default()
        };
        let mut total_probe_length = 0;
        for start in 0..self.bucket_count() {
            if self.tails.is_empty(start) || self.tails.predecessor(start, mask).is_some() {
                continue;
            }
            let chain = self.chain_from(start, &hasher);
            stats.chains += 1;
            stats.longest_chain = stats.longest_chain.max(chain.buckets.len());
            // A hit walks from the entry's home to the entry.
            total_probe_length += chain
                .homes
                .iter()
                .enumerate()
                .map(|(at, home)| at - home.unwrap_or(0) + 1)
                .sum::<usize>();
        }
        if self.items > 0 {
            stats.avg_probe_length = total_probe_length as f64 / self.items as f64;
        }
        stats
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            buckets: self.buckets.iter().enumerate(),
            tails: &self.tails,
            remaining: self.items,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            buckets: self.buckets.iter_mut().enumerate(),
            tails: &self.tails,
            remaining: self.items,
        }
    }

    /// Takes every entry out, leaving an empty table of the same size.
    pub fn drain(&mut self) -> IntoIter<T> {
        let buckets = self.bucket_count();
        let remaining = mem::replace(&mut self.items, 0);
        let iter = IntoIter {
            buckets: mem::replace(&mut self.buckets, Box::new_uninit_slice(buckets)),
            tails: mem::replace(&mut self.tails, Tails::new(buckets)),
            index: 0,
            remaining,
        };
        self.bump_version();
        iter
    }

    pub fn cursor(&self) -> RawCursor {
        RawCursor {
            index: 0,
            version: self.version,
        }
    }

    /// Checks the chain structure, returning a description of the first
    /// violation found.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self, hasher: impl Fn(&T) -> u64) -> std::result::Result<(), String> {
        let mask = self.bucket_mask;
        let buckets = self.bucket_count();
        if self.tails.len() != buckets || self.buckets.len() != buckets {
            return Err(format!(
                "bucket array ({}) and tails ({}) out of step",
                self.buckets.len(),
                self.tails.len()
            ));
        }
        if self.tails.occupied() != self.items {
            return Err(format!(
                "{} occupied buckets but {} items",
                self.tails.occupied(),
                self.items
            ));
        }

        let mut jumped_into = vec![false; buckets];
        for index in 0..buckets {
            if self.tails.is_solo_or_empty(index) {
                continue;
            }
            let next = self.tails.tail_index(index, mask).map_err(|err| err.to_string())?;
            if next == index {
                return Err(format!("bucket {index} jumps onto itself"));
            }
            if self.tails.is_empty(next) {
                return Err(format!("bucket {index} jumps to EMPTY bucket {next}"));
            }
            if mem::replace(&mut jumped_into[next], true) {
                return Err(format!("bucket {next} is jumped to twice"));
            }
        }

        let mut visited = vec![false; buckets];
        for start in 0..buckets {
            if self.tails.is_empty(start) || jumped_into[start] {
                continue;
            }
            let chain = self.chain_from(start, &hasher);
            for (&index, home) in chain.buckets.iter().zip(&chain.homes) {
                visited[index] = true;
                if home.is_none() {
                    return Err(format!("bucket {index} is not reachable from its home (chain {start})"));
                }
            }
        }
        for index in 0..buckets {
            if !self.tails.is_empty(index) && !visited[index] {
                return Err(format!("bucket {index} sits on a loop"));
            }
        }
        Ok(())
    }
}

impl<T> Default for RawTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for RawTable<T> {
    fn drop(&mut self) {
        self.drop_entries();
    }
}

impl<T: Clone> Clone for RawTable<T> {
    fn clone(&self) -> Self {
        let mut table = Self::with_buckets(self.bucket_count());
        for index in 0..self.bucket_count() {
            if self.tails.is_empty(index) {
                continue;
            }
            // Safety: occupied in `self`, EMPTY in `table`. The tail is copied
            // after the write so a panicking clone never exposes an
            // uninitialized bucket to `Drop`.
            unsafe { table.write(index, self.bucket(index).clone()) };
            table.tails.set_solo(index);
            table.items += 1;
        }
        table.tails = self.tails.clone();
        table.version = self.version;
        table
    }
}

impl<T> std::fmt::Debug for RawTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawTable")
            .field("items", &self.items)
            .field("buckets", &self.bucket_count())
            .field("version", &self.version)
            .field("tails", &self.tails)
            .finish()
    }
}

/// Position in a table that survives between calls but not across structural
/// changes to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCursor {
    index: usize,
    version: u64,
}

impl RawCursor {
    /// Next occupied bucket index, or `ConcurrentModification` if `table`
    /// changed shape since the cursor was made.
    pub fn next_index<T>(&mut self, table: &RawTable<T>) -> Result<Option<usize>> {
        if table.version != self.version {
            return Err(Error::ConcurrentModification {
                expected: self.version,
                found: table.version,
            });
        }
        while self.index < table.bucket_count() {
            let index = self.index;
            self.index += 1;
            if !table.tails.is_empty(index) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn next<'a, T>(&mut self, table: &'a RawTable<T>) -> Result<Option<&'a T>> {
        Ok(self.next_index(table)?.and_then(|index| table.get(index)))
    }

    /// Restarts from the first bucket, adopting the table's current version.
    pub fn reset<T>(&mut self, table: &RawTable<T>) {
        *self = table.cursor();
    }
}

pub struct Iter<'a, T> {
    buckets: std::iter::Enumerate<std::slice::Iter<'a, MaybeUninit<T>>>,
    tails: &'a Tails,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        for (index, bucket) in &mut self.buckets {
            if !self.tails.is_empty(index) {
                self.remaining -= 1;
                // Safety: occupied.
                return Some(unsafe { bucket.assume_init_ref() });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            buckets: self.buckets.clone(),
            tails: self.tails,
            remaining: self.remaining,
        }
    }
}

pub struct IterMut<'a, T> {
    buckets: std::iter::Enumerate<std::slice::IterMut<'a, MaybeUninit<T>>>,
    tails: &'a Tails,
    remaining: usize,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<&'a mut T> {
        if self.remaining == 0 {
            return None;
        }
        for (index, bucket) in &mut self.buckets {
            if !self.tails.is_empty(index) {
                self.remaining -= 1;
                // Safety: occupied.
                return Some(unsafe { bucket.assume_init_mut() });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

/// Owning iterator; also what [`RawTable::drain`] returns.
pub struct IntoIter<T> {
    buckets: Box<[MaybeUninit<T>]>,
    tails: Tails,
    index: usize,
    remaining: usize,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while self.index < self.buckets.len() {
            let index = self.index;
            self.index += 1;
            if !self.tails.is_empty(index) {
                self.remaining -= 1;
                // Safety: occupied, and `self.index` has moved past it so
                // `Drop` won't touch it again.
                return Some(unsafe { self.buckets[index].assume_init_read() });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> Drop for IntoIter<T> {
    fn drop(&mut self) {
        if mem::needs_drop::<T>() {
            for index in self.index..self.buckets.len() {
                if !self.tails.is_empty(index) {
                    // Safety: occupied and not yet yielded.
                    unsafe { self.buckets[index].assume_init_drop() };
                }
            }
        }
    }
}

impl<T> IntoIterator for RawTable<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(mut self) -> IntoIter<T> {
        self.drain()
    }
}
