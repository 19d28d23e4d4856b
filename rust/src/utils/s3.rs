use rand::{distr::Alphanumeric, Rng};

use crate::posts::Visibility;
use crate::server_state::Config;

/// Returns a random alphanumeric string of the given length.
pub fn get_random_string(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// A fresh key in the temp area for a user to upload into.
pub fn new_temp_key(config: &Config) -> String {
    format!("{}/{}", config.s3_temp_prefix, get_random_string(16))
}

/// Given a file name sent by a user, returns just the usable file name.
/// Returns None if nothing usable is left.
pub fn sanitize_file_name(file_name: &str) -> Option<String> {
    let last_segment = file_name
        .trim()
        .split_terminator(['/', '\\'])
        .last()?
        .trim();

    if last_segment.is_empty() || last_segment == "." || last_segment == ".." {
        return None;
    }

    Some(last_segment.to_string())
}

/// The permanent key a post's file ends up at. Deterministic, so the cover image URL can be
/// recomputed from the same inputs. Anything not public lives outside the public folder.
pub fn final_file_key(user_id: i64, post_id: i32, file_name: &str, visibility: Visibility) -> String {
    let access_folder = match visibility {
        Visibility::Public => "public",
        Visibility::Followers | Visibility::Private => "protected",
    };

    format!("{access_folder}/users/{user_id}/posts/{post_id}/{file_name}")
}

/// Users sometimes send back the whole URL of a temp object rather than its key.
/// Strips our own bucket host off if present and returns the key, as long as it's in the temp area.
pub fn clean_passed_key(passed_key: &str, config: &Config) -> Option<String> {
    let bucket_host_prefix = config.public_url("");

    let key = passed_key
        .trim()
        .strip_prefix(&bucket_host_prefix)
        .unwrap_or(passed_key.trim());

    let key = urlencoding::decode(key).ok()?.into_owned();

    if config.is_temp_key(&key) && !key.split('/').any(|segment| segment == "..") {
        Some(key)
    } else {
        None
    }
}
