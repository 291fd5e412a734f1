use reqwest::Url;

/// Join a URL and a path segment with exactly one '/' between them
pub fn add_url_segment(base: &str, segment: &str) -> String {
    match (base.ends_with('/'), segment.starts_with('/')) {
        (true, true) => format!("{}{}", base, &segment[1..]),
        (true, false) | (false, true) => format!("{}{}", base, segment),
        (false, false) => format!("{}/{}", base, segment),
    }
}

/// Definition path of a job relative to the server, e.g. `job/folder/job/name/`
///
/// Causes reference their upstream job by this form, so it is the key used to
/// correlate executions with tracked jobs.
pub fn job_identifier(task_url: &str, server_url: &str) -> String {
    if let Some(rest) = task_url.strip_prefix(server_url) {
        return rest.trim_start_matches('/').to_string();
    }

    // job hosted under a different server name than the endpoint
    let path = match Url::parse(task_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => task_url.to_string(),
    };
    let path = path.strip_prefix('/').unwrap_or(&path);
    match path.find("job/") {
        // server mounted below the host root, e.g. host/jenkins/job/name/
        Some(idx) if idx > 0 => path[idx..].to_string(),
        _ => path.to_string(),
    }
}

/// `folder/name` -> `/job/folder/job/name`
pub fn job_path(job_name: &str) -> String {
    format!("/job/{}", job_name.replace('/', "/job/"))
}
