use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mani_vm::vm::Vm;

const FIB: &str = "
local function fib(n)
    if n < 2 then return n end
    return fib(n - 1) + fib(n - 2)
end
return fib(15)
";

const LOOP: &str = "
local n = 0
for i = 1, 10000 do
    n = n + i
end
return n
";

fn bench_execute(c: &mut Criterion) {
    let (fib_chunk, fib_strings) = mani_compiler::compile(FIB).unwrap();
    c.bench_function("execute_fib_15", |b| {
        b.iter(|| {
            let mut vm = Vm::new();
            black_box(vm.execute(black_box(&fib_chunk), fib_strings.clone()).unwrap())
        })
    });

    let (loop_chunk, loop_strings) = mani_compiler::compile(LOOP).unwrap();
    c.bench_function("execute_sum_loop", |b| {
        b.iter(|| {
            let mut vm = Vm::new();
            black_box(vm.execute(black_box(&loop_chunk), loop_strings.clone()).unwrap())
        })
    });
}

criterion_group!(benches, bench_execute);
criterion_main!(benches);
