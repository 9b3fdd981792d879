use parcrypt_core::Direction;
use parcrypt_crypto::{lookup, BlockMode, KeyedCipherFactory, SecretKey};
use parcrypt_engine::{build_tasks, execute, ExecuteOptions, MemorySource};

const PAYLOAD: usize = 8 << 20;

fn make_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i.wrapping_mul(31) ^ (i >> 5)) as u8).collect()
}

#[divan::bench(args = [1, 2, 4, 8])]
fn bench_ctr_8mib(bencher: divan::Bencher, workers: usize) {
    let spec = lookup("aes-256").unwrap();
    let source = MemorySource::new(make_data(PAYLOAD));
    let iv = [0u8; 16];
    let factory = KeyedCipherFactory::new(
        spec,
        BlockMode::Ctr,
        Direction::Encrypt,
        SecretKey::from_bytes(vec![0x42; 32]),
        None,
    );
    let options = ExecuteOptions {
        workers,
        ..ExecuteOptions::default()
    };

    bencher
        .counter(divan::counter::BytesCount::new(PAYLOAD))
        .with_inputs(|| {
            build_tasks(spec, BlockMode::Ctr, PAYLOAD as u64, Some(&iv), workers > 1, workers, 64 * 1024)
                .unwrap()
        })
        .bench_values(|tasks| execute(tasks, &factory, &source, &options, None).unwrap());
}

fn main() {
    divan::main();
}
