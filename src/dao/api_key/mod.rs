mod api_key;

pub use api_key::{
    ApiKey,
    create_api_key,
    get_api_key_by_secret,
    get_active_api_key_by_secret,
    get_api_key_by_caller,
    deactivate_api_key,
    count_api_keys
};
