use chrono::{DateTime, Utc};

use crate::core::queue::JobQueue;
use crate::models::JobId;

/// Markdown rendering of the tracked job tree
///
/// Joined jobs are shown as the job they were folded into.
pub fn render_summary(queue: &JobQueue) -> String {
    let mut output = String::from("# Jenkins Results\n\n");
    let Some(root) = queue.root() else {
        output.push_str("No Jenkins job was tracked.\n");
        return output;
    };

    let started = queue
        .job(root)
        .result
        .as_ref()
        .and_then(|r| DateTime::<Utc>::from_timestamp_millis(r.timestamp));
    if let Some(started) = started {
        output.push_str(&format!("Started: {}\n\n", started.format("%Y-%m-%d %H:%M:%S UTC")));
    }

    walk(queue, root, 0, &mut output);
    output
}

fn walk(queue: &JobQueue, id: JobId, depth: usize, output: &mut String) {
    let job = queue.job(queue.working_job(id));
    let indent = "  ".repeat(depth);
    match (&job.executable_url, job.executable_number) {
        (Some(url), Some(number)) => output.push_str(&format!(
            "{}- [{} #{}]({}) {}\n",
            indent,
            job.name,
            number,
            url,
            job.result_string()
        )),
        _ => output.push_str(&format!("{}- {} {}\n", indent, job.name, job.result_string())),
    }
    for child in &job.children {
        walk(queue, *child, depth + 1, output);
    }
}
