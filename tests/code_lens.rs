use api_console::analyzer::EndpointAnalyzer;
use api_console::codelens::{CodeLensCache, CodeLensProvider, LensResult, ManualClock};
use api_console::document::SourceDocument;
use std::sync::Arc;
use std::time::Duration;

const ORDERS: &str = r#"[ApiController]
[Route("api/[controller]")]
public class OrdersController : ControllerBase
{
    [HttpGet]
    public IActionResult List() => Ok();

    [HttpPut("{id}")]
    public IActionResult Update(int id, [FromBody] OrderUpdate update) => Ok();
}
"#;

fn orders(version: i64, text: &str) -> SourceDocument {
    SourceDocument::new("/src/Api/Controllers/OrdersController.cs", version, text)
}

#[test]
fn lru_evicts_least_recently_accessed() {
    let clock = Arc::new(ManualClock::new());
    let cache: CodeLensCache<u32> = CodeLensCache::with_clock(2, None, clock);

    cache.set("a", 1, 10);
    cache.set("b", 1, 20);
    assert_eq!(cache.lookup("a", 1), Some(10));
    cache.set("c", 1, 30);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.lookup("b", 1), None);
    assert_eq!(cache.lookup("a", 1), Some(10));
    assert_eq!(cache.lookup("c", 1), Some(30));
}

#[test]
fn zero_capacity_is_unbounded_and_zero_ttl_never_expires() {
    let clock = Arc::new(ManualClock::new());
    let cache: CodeLensCache<usize> =
        CodeLensCache::with_clock(0, Some(Duration::ZERO), clock.clone());
    for i in 0..250 {
        cache.set(&format!("doc-{i}"), 1, i);
    }
    clock.advance(Duration::from_secs(24 * 60 * 60));
    assert_eq!(cache.len(), 250);
    assert_eq!(cache.lookup("doc-0", 1), Some(0));
}

#[test]
fn expired_entry_is_evicted_on_read() {
    let clock = Arc::new(ManualClock::new());
    let cache: CodeLensCache<&str> =
        CodeLensCache::with_clock(10, Some(Duration::from_secs(300)), clock.clone());
    cache.set("doc", 7, "lenses");
    clock.advance(Duration::from_secs(301));
    assert!(cache.get("doc").is_none());
    assert!(cache.is_empty());
}

#[test]
fn provider_scans_synchronously_without_debounce() {
    let analyzer = Arc::new(EndpointAnalyzer::new("1.0"));
    let provider = CodeLensProvider::new(analyzer, Arc::new(CodeLensCache::new(10, None)), Duration::ZERO);

    let lenses = match provider.provide(&orders(1, ORDERS)) {
        LensResult::Ready(lenses) => lenses,
        LensResult::Debounced(_) => panic!("zero debounce should scan immediately"),
    };
    let titles: Vec<&str> = lenses.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, vec!["⚡ GET /api/orders", "⚡ PUT /api/orders/{id}"]);
    assert_eq!(lenses[0].line, 5);
    assert_eq!(lenses[0].column, 25);
    assert_eq!(provider.cache().lookup(&orders(1, ORDERS).uri, 1).map(|l| l.len()), Some(2));
}

#[test]
fn provider_serves_stale_lenses_until_debounced_rescan() {
    let analyzer = Arc::new(EndpointAnalyzer::new("1.0"));
    let cache = Arc::new(CodeLensCache::new(10, None));
    let provider = CodeLensProvider::new(analyzer, Arc::clone(&cache), Duration::from_millis(20));

    let first = match provider.provide(&orders(1, ORDERS)) {
        LensResult::Debounced(pending) => {
            assert!(pending.stale().is_none());
            pending.wait().expect("first scan")
        }
        LensResult::Ready(_) => panic!("first request should be debounced"),
    };
    assert_eq!(first.len(), 2);

    match provider.provide(&orders(1, ORDERS)) {
        LensResult::Ready(lenses) => assert_eq!(lenses, first),
        LensResult::Debounced(_) => panic!("same version should hit the cache"),
    }

    let edited = ORDERS.replace("[HttpPut(\"{id}\")]", "[HttpDelete(\"{id}\")]");
    match provider.provide(&orders(2, &edited)) {
        LensResult::Debounced(pending) => {
            assert_eq!(pending.stale().map(Vec::len), Some(2));
            let fresh = pending.wait().expect("rescan");
            assert_eq!(fresh[1].title, "⚡ DELETE /api/orders/{id}");
        }
        LensResult::Ready(_) => panic!("new version should be debounced"),
    }
    assert_eq!(cache.get(&orders(2, &edited).uri).map(|r| r.version), Some(2));
}

#[test]
fn closing_a_document_drops_its_lenses() {
    let analyzer = Arc::new(EndpointAnalyzer::new("1.0"));
    let provider = CodeLensProvider::new(analyzer, Arc::new(CodeLensCache::new(10, None)), Duration::ZERO);
    let doc = orders(3, ORDERS);

    let _ = provider.provide(&doc);
    assert_eq!(provider.cache().len(), 1);
    provider.close_document(&doc.uri);
    assert!(provider.cache().is_empty());
}
