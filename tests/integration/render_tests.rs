//! Offline rendering from a metadata file

use sfsf_ingest::render;
use sfsf_ingest::sql::CastOptions;

use crate::common::{fixture_path, warehouse_config};

#[test]
fn test_render_emp_job_sections_in_order() {
    let text = render(
        &fixture_path("EmpJob_metadata.xml"),
        "EmpJob",
        &warehouse_config(),
        CastOptions::default(),
    )
    .unwrap();

    let titles: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("-- "))
        .collect();
    assert_eq!(
        titles,
        vec![
            "final table",
            "refined table",
            "staging table",
            "staging to final",
            "daily merge"
        ]
    );

    assert!(text.contains("PARTITION BY TIMESTAMP_TRUNC(_PARTITIONTIME, DAY)"));
    assert!(text.contains("INSERT INTO `raw-proj.ds_sfsf_ec.EmpJob` ("));
    assert!(text.contains("  CAST(isActive AS BOOL) AS isActive\n"));
    assert!(text.contains("ON source.personIdExternal=target.personIdExternal\n"));
}

#[test]
fn test_render_missing_file() {
    let err = render(
        &fixture_path("Nope_metadata.xml"),
        "Nope",
        &warehouse_config(),
        CastOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("Nope_metadata.xml"));
}

#[test]
fn test_render_rejects_unsupported_type() {
    let err = render(
        &fixture_path("Unsupported_metadata.xml"),
        "Photo",
        &warehouse_config(),
        CastOptions::default(),
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unsupported OData type 'Edm.Stream' for field photoStream"
    );
}
