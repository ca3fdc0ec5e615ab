use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ember::{
    compiler::compile,
    config::Config,
    vm::{interpret, InterpretResult},
};

const FIB: &str = r#"
    fun fib(n) {
        var a = 0;
        var b = 1;
        var i = 0;
        while (i < n) {
            var t = a + b;
            a = b;
            b = t;
            i = i + 1;
        }
        return a;
    }
    return fib(30);
"#;

fn bench_compile(c: &mut Criterion) {
    // A source large enough that parsing dominates over setup, but small
    // enough that the script's constant pool stays within its 256 slots.
    let mut source = String::new();
    for i in 0..100 {
        source.push_str(&format!(
            "fun f{i}(a, b) {{ if (a < b) {{ return a * b; }} return a - b; }}\n"
        ));
    }

    c.bench_function("compile 100 functions", |b| {
        b.iter(|| black_box(compile(Rc::from(source.as_str()), Config::quiet())))
    });
}

fn bench_interpret(c: &mut Criterion) {
    c.bench_function("fib_iter 30", |b| {
        b.iter(|| {
            let result = interpret(FIB, Config::quiet());
            assert!(matches!(result, InterpretResult::Ok(_)));
            black_box(result)
        })
    });
}

criterion_group!(benches, bench_compile, bench_interpret);
criterion_main!(benches);
