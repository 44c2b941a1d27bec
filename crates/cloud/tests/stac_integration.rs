//! Integration tests against real STAC catalogs.
//!
//! Tests marked `#[ignore]` require network access.
//! Run with: `cargo test -p lcmap-cloud -- --ignored stac`

use geo::{polygon, MultiPolygon};
use lcmap_cloud::landsat::{self, LandsatQuery, TargetGrid, STAC_COLLECTION};
use lcmap_cloud::stac_client::{StacCatalog, StacClient, StacClientOptions};
use lcmap_cloud::stac_models::StacSearchParams;

/// Paddy fields south of Hanoi.
fn aoi() -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon![
        (x: 105.80, y: 20.95),
        (x: 105.84, y: 20.95),
        (x: 105.84, y: 20.99),
        (x: 105.80, y: 20.99),
        (x: 105.80, y: 20.95),
    ]])
}

#[tokio::test]
#[ignore]
async fn stac_planetary_computer_landsat9() {
    let client = StacClient::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client");
    let grid = TargetGrid::covering(&aoi(), None).unwrap();

    let items = landsat::search_scenes(&client, &grid, &LandsatQuery::year(2022))
        .await
        .expect("search failed");

    println!("Found {} Landsat 9 items", items.len());
    assert!(!items.is_empty());
    for item in &items {
        assert_eq!(item.properties.platform.as_deref(), Some("landsat-9"));
        assert!(item.asset("qa_pixel").is_some());
        assert!(item.asset("red").is_some());
    }
}

#[tokio::test]
#[ignore]
async fn stac_paginated_search() {
    let options = StacClientOptions {
        max_items: 15,
        ..Default::default()
    };
    let client = StacClient::new(StacCatalog::PlanetaryComputer, options)
        .expect("failed to create client");

    let params = StacSearchParams::new()
        .bbox(105.0, 20.0, 107.0, 22.0)
        .datetime("2022-01-01/2023-12-31")
        .collections(&[STAC_COLLECTION])
        .platform("landsat-9")
        .limit(5);

    let items = client.search_all(&params).await.expect("search_all failed");
    println!("Fetched {} items across pages", items.len());
    assert!(items.len() > 5, "should have fetched more than one page");
    assert!(items.len() <= 15, "should respect max_items");
}

#[tokio::test]
#[ignore]
async fn stac_fetch_one_scene() {
    let client = StacClient::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client");
    let grid = TargetGrid::covering(&aoi(), None).unwrap();
    let mut query = LandsatQuery::year(2022);
    query.max_cloud_cover = Some(20.0);

    let items = landsat::search_scenes(&client, &grid, &query).await.unwrap();
    let first = items.into_iter().next().expect("no low-cloud scene");
    let collection = landsat::fetch_collection(&client, &[first], &grid, &["SR_B4".into()], 1)
        .await
        .expect("fetch failed");

    let scene = &collection.scenes()[0];
    assert_eq!(scene.shape(), Some((grid.rows, grid.cols)));
    assert!(scene.qa_pixel().is_some());
}
