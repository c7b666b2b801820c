//! Benchmarks for the `svninfo` crate.
//!
//! Run with:
//! - `cargo bench`

#![allow(missing_docs)]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use svninfo::{WorkingCopyInfo, parse_info_xml};

const FILE_ENTRY: &str = r#"<entry
   path="checkout/README"
   revision="1234"
   kind="file">
<url>https://svn.example.org/repo/trunk/README</url>
<relative-url>^/trunk/README</relative-url>
<repository>
<root>https://svn.example.org/repo</root>
<uuid>11111111-2222-3333-4444-555555555555</uuid>
</repository>
<wc-info>
<wcroot-abspath>/var/ci/workspace/checkout</wcroot-abspath>
<schedule>normal</schedule>
<depth>infinity</depth>
<text-updated>2024-01-01T00:00:00.000000Z</text-updated>
<checksum>0123456789abcdef0123456789abcdef01234567</checksum>
</wc-info>
<commit
   revision="1200">
<author>alice</author>
<date>2024-01-01T00:00:00.000000Z</date>
</commit>
</entry>
"#;

fn abort_with_error(message: &str) -> ! {
    eprintln!("{message}");
    std::process::abort();
}

fn bench_parse_info_xml(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_info_xml");
    for records in [1usize, 16, 256] {
        // Only the first record is consumed; the rest measures the early stop.
        let text = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<info>\n{}</info>\n",
            FILE_ENTRY.repeat(records)
        );
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(records), &text, |b, text| {
            b.iter(|| {
                let entry = match parse_info_xml(black_box(text)) {
                    Ok(entry) => entry,
                    Err(_) => abort_with_error("parse_info_xml failed for benchmark input"),
                };
                black_box(entry);
            });
        });
    }
    group.finish();
}

fn bench_info_from_pairs(c: &mut Criterion) {
    let pairs = [
        ("REVISION", "1234"),
        ("URL", "https://svn.example.org/repo/trunk"),
        ("CHECKSUM", ""),
        ("REPOSITORY_UUID", "11111111-2222-3333-4444-555555555555"),
        ("LAST_AUTHOR", "alice"),
        ("LAST_CHANGE_REVISION", "1200"),
    ];
    c.bench_function("info_from_pairs", |b| {
        b.iter(|| {
            let info = match WorkingCopyInfo::from_pairs(black_box(pairs)) {
                Ok(info) => info,
                Err(_) => {
                    abort_with_error("WorkingCopyInfo::from_pairs failed for benchmark input")
                }
            };
            black_box(info.to_pairs());
        });
    });
}

criterion_group!(benches, bench_parse_info_xml, bench_info_from_pairs);
criterion_main!(benches);
