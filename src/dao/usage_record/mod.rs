mod usage_record;

pub use usage_record::{
    UsageRecord,
    create_usage_record,
    list_usage_records_since,
    list_usage_records_by_caller,
    count_usage_records_by_caller,
    count_usage_records
};
