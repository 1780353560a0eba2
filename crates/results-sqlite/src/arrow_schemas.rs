use arrow::datatypes::{DataType, Field, Schema};

pub fn discovered_ips_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("job_id", DataType::Utf8, false),
        Field::new("ip_address", DataType::Utf8, false),
        Field::new("is_active", DataType::Boolean, false),
        Field::new("open_ports", DataType::Utf8, false),
        Field::new("services", DataType::Utf8, false),
        Field::new("scan_time_ms", DataType::Int64, false),
        Field::new("scan_method", DataType::Utf8, false),
        Field::new("created_ms", DataType::Int64, false),
    ])
}

pub fn resolved_domains_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("job_id", DataType::Utf8, false),
        Field::new("ip_address", DataType::Utf8, false),
        Field::new("domain_name", DataType::Utf8, false),
        Field::new("domain_type", DataType::Utf8, false),
        Field::new("created_ms", DataType::Int64, false),
    ])
}
