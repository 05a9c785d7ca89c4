//! Healing Benchmarks
//!
//! Benchmarks for HTML parsing, selector evaluation and the full healing
//! pipeline.
//!
//! Run with: `cargo bench --bench heal_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use locheal::prelude::*;

fn product_page(items: usize) -> String {
    let mut html = String::from(r#"<div class="product-list">"#);
    for i in 0..items {
        html.push_str(&format!(
            r#"<div class="product-item" data-testid="item-{i}">
                <h3>Product {i}</h3>
                <div class="actions"><button class="btn add">Add to Cart</button></div>
            </div>"#
        ));
    }
    html.push_str(r#"<form id="login"><label>Username:</label><input name="user">"#);
    html.push_str(r#"<div id="modal"><div class="modal-content"><button id="login-btn">Login</button></div></div></form></div>"#);
    html
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for items in [10, 100, 500] {
        let html = product_page(items);
        group.bench_with_input(BenchmarkId::from_parameter(items), &html, |bench, html| {
            bench.iter(|| black_box(parse(black_box(html)).unwrap()));
        });
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let tree = parse(&product_page(100)).unwrap();
    let mut group = c.benchmark_group("select");
    let selectors = [
        ("id", "#login-btn"),
        ("class", ".product-item"),
        ("attribute", "[data-testid=\"item-42\"]"),
        ("descendant", "div.product-item div.actions button"),
        ("nth_of_type", "div.product-item:nth-of-type(7) button"),
        ("xpath", "//div[@class='actions']/button"),
        ("xpath_text", "//h3[contains(text(), 'Product 9')]"),
    ];
    for (name, selector) in selectors {
        group.bench_with_input(BenchmarkId::from_parameter(name), &selector, |bench, sel| {
            bench.iter(|| black_box(tree.select(black_box(sel))));
        });
    }
    group.finish();
}

fn bench_heal(c: &mut Criterion) {
    let mut group = c.benchmark_group("heal");
    let healer = Healer::default();
    for items in [10, 100] {
        let context = HealingContext::new("#old-login", LocatorType::Css)
            .with_anchors(["Username:"])
            .with_visible_text("Login");
        let request = HealRequest::new(product_page(items), context);
        group.bench_with_input(BenchmarkId::from_parameter(items), &request, |bench, req| {
            bench.iter(|| black_box(healer.heal(black_box(req)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_select, bench_heal);
criterion_main!(benches);
