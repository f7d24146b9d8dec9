use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mani_compiler::scanner::scan;

const SAMPLE: &str = r#"
local function fib(n)
    if n < 2 then return n end
    return fib(n - 1) + fib(n - 2)
end

local total = 0
for i = 1, 100 do
    total = total + fib(10)
end

local t = {1, 2, 3, x = "a", ["y"] = "b"}
return total
"#;

fn bench_scan(c: &mut Criterion) {
    c.bench_function("scan_sample", |b| {
        b.iter(|| scan(black_box(SAMPLE)).unwrap())
    });
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_sample", |b| {
        b.iter(|| mani_compiler::compile(black_box(SAMPLE)).unwrap())
    });
}

criterion_group!(benches, bench_scan, bench_compile);
criterion_main!(benches);
