use std::{
    hash::{BuildHasher, BuildHasherDefault, Hasher},
    hint::black_box,
    io::Write,
    time::Instant,
};

use compact_table::CompactMap;

mod logging;

const ITERS: usize = 10_000_000;
const TRACK_PROBE_LENGTH: bool = false;

/// Low key bits cleared by the aligned-keys workload.
const ALIGN_BITS: u32 = 3;

/// Hashes a `u64` key to itself.
#[derive(Default)]
struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | b as u64;
        }
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

type Identity = BuildHasherDefault<IdentityHasher>;

trait PrintStats {
    fn print_stats(&self) {}
}

impl<S> PrintStats for hashbrown::HashMap<u64, u64, S> {}

impl<S: BuildHasher> PrintStats for CompactMap<u64, u64, S> {
    fn print_stats(&self) {
        self.probe_stats().print();
    }
}

trait InsertAndErase {
    fn insert_and_erase(&mut self, key: u64, value: u64);
}

impl InsertAndErase for hashbrown::HashMap<u64, u64> {
    fn insert_and_erase(&mut self, key: u64, value: u64) {
        self.entry(key).insert(value).remove();
    }
}

impl InsertAndErase for CompactMap<u64, u64> {
    fn insert_and_erase(&mut self, key: u64, value: u64) {
        self.insert(key, value);
        self.remove(&key);
    }
}

fn drop_spaces(s: &str) -> String {
    s.split_whitespace().collect()
}

fn flush_stdout() {
    let _ = std::io::stdout().flush();
}

macro_rules! benchmark_find_miss {
    ($table:ty, $v:ty) => {
        (|n: usize| {
            print!("find_miss  {}/{n}: ", drop_spaces(stringify!($table)));
            flush_stdout();
            let mut table = <$table>::with_capacity(n);
            let mut rng = fastrand::Rng::with_seed(123);
            for _ in 0..n {
                let key = rng.u64(..);
                table.insert(key, <$v>::default());
            }
            let start = Instant::now();
            let mut found = 0;
            for _ in 0..ITERS {
                let key = rng.u64(..);
                found += table.get(&key).is_some() as usize;
            }
            black_box(found);
            let duration = start.elapsed();
            println!("{:.2} ns/op", duration.as_nanos() as f64 / ITERS as f64);
            if TRACK_PROBE_LENGTH {
                table.print_stats();
            }
        })
    };
}

macro_rules! benchmark_find_hit {
    ($table:ty, $v:ty) => {
        (|n: usize| {
            print!("find_hit  {}/{n}: ", drop_spaces(stringify!($table)));
            flush_stdout();
            let mut table = <$table>::with_capacity(n);
            let mut rng = fastrand::Rng::with_seed(123);
            for _ in 0..n {
                let key = rng.u64(..);
                table.insert(key, <$v>::default());
            }
            let outer_iters = ITERS.div_ceil(n);
            let true_iters = outer_iters * n;
            let start = Instant::now();
            let mut found = 0;
            for _ in 0..outer_iters {
                let mut rng = fastrand::Rng::with_seed(123);
                for _ in 0..n {
                    let key = rng.u64(..);
                    found += table.get(&key).is_some() as usize;
                }
            }
            black_box(found);
            let duration = start.elapsed();
            println!(
                "{:.2} ns/op",
                duration.as_nanos() as f64 / true_iters as f64
            );
            if TRACK_PROBE_LENGTH {
                table.print_stats();
            }
        })
    };
}

macro_rules! benchmark_insert_and_erase {
    ($table:ty, $v:ty) => {
        (|n: usize| {
            print!("insert_erase  {}/{n}: ", drop_spaces(stringify!($table)));
            flush_stdout();
            let mut table = <$table>::with_capacity(n);
            let mut rng = fastrand::Rng::with_seed(123);
            for _ in 0..n {
                let key = rng.u64(..);
                table.insert(key, <$v>::default());
            }
            let outer_iters = ITERS.div_ceil(n);
            let true_iters = outer_iters * n;
            let start = Instant::now();
            for _ in 0..outer_iters {
                let mut rng = fastrand::Rng::with_seed(456);
                for _ in 0..n {
                    let key = rng.u64(..);
                    table.insert_and_erase(key, <$v>::default());
                }
            }
            let duration = start.elapsed();
            println!(
                "{:.2} ns/op",
                duration.as_nanos() as f64 / true_iters as f64
            );
        })
    };
}

/// Keys with their low `ALIGN_BITS` bits clear, under an identity hash. Only
/// one bucket in `1 << ALIGN_BITS` is anyone's home, so chains are shared by
/// several keys and run through the buckets in between.
macro_rules! benchmark_aligned_keys {
    ($table:ty) => {
        (|n: usize| {
            print!("aligned_keys  {}/{n}: ", drop_spaces(stringify!($table)));
            flush_stdout();
            let mut table = <$table>::with_capacity_and_hasher(n, Identity::default());
            let mut rng = fastrand::Rng::with_seed(789);
            let keys: Vec<u64> = (0..n).map(|_| rng.u64(..) << ALIGN_BITS).collect();

            let start = Instant::now();
            for &key in &keys {
                table.insert(key, key);
            }
            let insert_duration = start.elapsed();

            let outer_iters = ITERS.div_ceil(n);
            let true_iters = outer_iters * n;
            let start = Instant::now();
            let mut found = 0;
            for _ in 0..outer_iters {
                for key in &keys {
                    found += table.get(key).is_some() as usize;
                }
            }
            black_box(found);
            let find_duration = start.elapsed();
            println!(
                "insert {:.2} ns/op, find_hit {:.2} ns/op",
                insert_duration.as_nanos() as f64 / n as f64,
                find_duration.as_nanos() as f64 / true_iters as f64
            );
            if TRACK_PROBE_LENGTH {
                table.print_stats();
            }
        })
    };
}

fn main() {
    logging::init();

    for lg_mi in [10, 15, 20, 25] {
        println!("mi: 2^{lg_mi}");
        let mi = 1 << lg_mi;
        // The compact table resizes past 6/8, so higher loads only measure
        // a table twice as large.
        for load_factor in [4, 5, 6] {
            println!("load factor: {}/8", load_factor);
            let n = mi * load_factor / 8;
            log::info!("benchmarking {n} entries");
            macro_rules! benchmark_all {
                ($benchmark:ident) => {
                    $benchmark!(CompactMap::<u64, u64>, u64)(n);
                    $benchmark!(hashbrown::HashMap::<u64, u64>, u64)(n);
                };
            }

            benchmark_all!(benchmark_find_miss);
            benchmark_all!(benchmark_find_hit);
            benchmark_all!(benchmark_insert_and_erase);
            benchmark_aligned_keys!(CompactMap::<u64, u64, Identity>)(n);
            benchmark_aligned_keys!(hashbrown::HashMap::<u64, u64, Identity>)(n);
        }
    }
}
