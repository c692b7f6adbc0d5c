use chart_coder::recover;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn synthetic_suggestions(count: usize) -> String {
    let icd: Vec<String> = (0..count)
        .map(|i| format!(r#"{{"code": "E11.{i}", "rationale": "Documented A1c {i}.2%"}}"#))
        .collect();
    let cpt: Vec<String> = (0..count)
        .map(|i| {
            format!(r#"{{"code": "99{i:03}", "modifiers": ["25"], "units": "1", "rationale": "Visit {i}"}}"#)
        })
        .collect();
    format!(
        r#"{{"suggestedIcd": [{}], "suggestedCpt": [{}]}}"#,
        icd.join(", "),
        cpt.join(", ")
    )
}

fn bench_recover(c: &mut Criterion) {
    let payload = synthetic_suggestions(200);

    let fenced = format!("Here are the codes:\n```json\n{payload}\n```\nLet me know.");
    c.bench_function("recover_fenced", |b| {
        b.iter(|| black_box(recover(black_box(&fenced))));
    });

    let prose = format!("Sure! {{\"note\": 1}} The full answer is {payload} as requested.");
    c.bench_function("recover_longest_object", |b| {
        b.iter(|| black_box(recover(black_box(&prose))));
    });

    let cut = payload.len() * 3 / 4;
    let truncated = payload[..cut].to_string();
    c.bench_function("recover_truncated_repair", |b| {
        b.iter(|| black_box(recover(black_box(&truncated))));
    });
}

criterion_group!(normalize, bench_recover);
criterion_main!(normalize);
