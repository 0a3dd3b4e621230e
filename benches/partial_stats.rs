use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use strata_fit_stats::algorithms::strata_fit::compute_partial_stats;
use strata_fit_stats::data::Dataset;

const HEADER: &str = "pat_ID,Visit_months_from_diagnosis,Age_diagnosis,Sex,RF_positivity,anti_CCP,Year_diagnosis,csDMARD1,csDMARD2,csDMARD3,bDMARD,tsDMARD,GC,DAS28,ESR,CRP,TJC28,SJC28,Pat_global,Ph_global,Pain";

fn node_dataset(patients: usize, visits: usize) -> Dataset {
    let mut content = String::from(HEADER);
    for p in 0..patients {
        let sex = if p % 2 == 0 { "F" } else { "M" };
        for v in 0..visits {
            content.push_str(&format!(
                "\n{},{},{},{},positive,negative,{},MTX,,,,,,{:.2},{},{:.1},{},{},{},{},{}",
                p,
                v * 6,
                35 + p % 40,
                sex,
                1990 + p % 30,
                5.0 - 0.2 * v as f64,
                20 + p % 15,
                10.0 + (p % 7) as f64,
                p % 10,
                p % 6,
                40 + p % 30,
                35 + p % 25,
                45 + p % 20,
            ));
        }
    }
    Dataset::from_csv_str(&content).expect("generated dataset parses")
}

fn bench_partial_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("partial_stats");
    for patients in [100, 1_000] {
        let dataset = node_dataset(patients, 4);
        group.bench_with_input(BenchmarkId::from_parameter(patients), &dataset, |b, df| {
            b.iter(|| compute_partial_stats(black_box(df), 5))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_partial_stats);
criterion_main!(benches);
