use api_console::analyzer::EndpointAnalyzer;
use api_console::codelens::{self, CodeLensCache};
use api_console::document::SourceDocument;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt::Write;
use std::time::Duration;

fn generated_controller(actions: usize) -> SourceDocument {
    let mut text = String::from(
        "using Microsoft.AspNetCore.Mvc;\n\n[ApiController]\n[ApiVersion(\"3.0\")]\n[Route(\"api/v{version:apiVersion}/[controller]\")]\npublic class OrdersController : ControllerBase\n{\n",
    );
    for i in 0..actions {
        let verb = match i % 4 {
            0 => "HttpGet",
            1 => "HttpPost",
            2 => "HttpPut",
            _ => "HttpDelete",
        };
        let _ = write!(
            text,
            "    /// <summary>Action {i}</summary>\n    [{verb}(\"items/{{id}}/step{i}\")]\n    public async Task<IActionResult> Step{i}Async(int id, [FromQuery] string? filter, CancellationToken ct)\n    {{\n        return Ok();\n    }}\n\n"
        );
    }
    text.push_str("}\n");
    SourceDocument::new("/bench/Api/Controllers/OrdersController.cs", 1, text)
}

fn bench_scan_document(c: &mut Criterion) {
    let document = generated_controller(200);
    let mut group = c.benchmark_group("scan_document");

    group.bench_function("cold_analyzer", |b| {
        b.iter(|| {
            let analyzer = EndpointAnalyzer::new("1.0");
            black_box(analyzer.scan_document(black_box(&document)).len())
        })
    });

    let analyzer = EndpointAnalyzer::new("1.0");
    group.bench_function("warm_version_cache", |b| {
        b.iter(|| black_box(analyzer.scan_document(black_box(&document)).len()))
    });

    group.finish();
}

fn bench_lens_cache(c: &mut Criterion) {
    let analyzer = EndpointAnalyzer::new("1.0");
    let document = generated_controller(50);
    let lenses = codelens::scan_lenses(&analyzer, &document);
    let cache = CodeLensCache::new(100, Some(Duration::from_secs(300)));
    for i in 0..100 {
        cache.set(&format!("doc-{i}"), 1, lenses.clone());
    }

    c.bench_function("lens_cache_hit", |b| {
        b.iter(|| black_box(cache.lookup(black_box("doc-42"), 1).map(|l| l.len())))
    });
}

criterion_group!(benches, bench_scan_document, bench_lens_cache);
criterion_main!(benches);
