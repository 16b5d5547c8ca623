use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use weft::{reconcile, Config, DirectiveSettings, Document, Runtime};

fn list_markup(rows: usize, changed: Option<usize>) -> String {
    let mut html = String::from("<ul>");
    for i in 0..rows {
        if Some(i) == changed {
            html.push_str(&format!("<li class=\"row\">changed {}</li>", i));
        } else {
            html.push_str(&format!("<li class=\"row\">row {}</li>", i));
        }
    }
    html.push_str("</ul>");
    html
}

fn benchmark_reconcile(c: &mut Criterion) {
    let settings = DirectiveSettings::default();
    let original = list_markup(100, None);
    let edited = list_markup(100, Some(50));

    let mut doc = Document::parse("<html><body></body></html>").unwrap();
    let body = doc.body().unwrap();
    let container = doc.parse_fragment(&original, "div").unwrap();
    doc.append_child(body, container).unwrap();

    let mut flip = false;
    c.bench_function("reconcile_one_text_change_100_rows", |b| {
        b.iter(|| {
            flip = !flip;
            let markup = if flip { &edited } else { &original };
            let patch = reconcile(&mut doc, container, black_box(markup), &settings).unwrap();
            black_box(patch);
        })
    });
}

fn benchmark_mounted_update(c: &mut Criterion) {
    let runtime = Runtime::new(Config::default()).unwrap();
    runtime
        .register_template("counter", "<p>[count]</p><ul>[items]<li>[_value]</li>[/items]</ul>")
        .unwrap();
    let doc = Rc::new(RefCell::new(
        Document::parse("<html><body></body></html>").unwrap(),
    ));
    let mounted = runtime
        .mount(&doc, "counter", json!({"count": 0, "items": ["a", "b", "c"]}))
        .unwrap();
    let state = mounted.state();

    let mut count = 0;
    c.bench_function("mounted_state_write", |b| {
        b.iter(|| {
            count += 1;
            state.set("count", black_box(count));
        })
    });
}

criterion_group!(benches, benchmark_reconcile, benchmark_mounted_update);
criterion_main!(benches);
