//! End-to-end tracking runs against a scripted server

use jenkins_queue::core::HttpResponse;
use jenkins_queue::models::{JobId, JobState};

mod common;

use common::*;

#[tokio::test(start_paused = true)]
async fn test_single_job_streams_until_done() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    server.on(&console_url("root", 7, 0), console_chunk("line 1\n", Some(7)));
    server.on(&console_url("root", 7, 7), console_chunk("line 2\n", None));
    server.on_json(&result_url("root", 7), &result("SUCCESS", 1000));

    let (mut queue, sink) = new_queue(test_options(), &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(summary.root_result, "Succeeded");
    assert_eq!(summary.message, "Jenkins pipeline complete");
    assert_eq!(queue.job(root).state, JobState::Done);
    assert_eq!(queue.job(root).executable_url.as_deref(), Some("http://jenkins/job/root/7"));

    let output = sink.text();
    let started = output.find("Jenkins job started: root\nhttp://jenkins/job/root/7").unwrap();
    let logged = output.find("line 1\nline 2\n").unwrap();
    let finished = output.find("Jenkins job finished: root").unwrap();
    assert!(started < logged && logged < finished);
    assert!(summary.report.contains("- [root #7](http://jenkins/job/root/7) Succeeded"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_result_fails_the_run() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(3)));
    script_execution(&server, "root", 3, "boom\n", "FAILURE", 1000);

    let (mut queue, _) = new_queue(test_options(), &server);
    queue.add_root(&task_url("root"), "root", 3);
    let summary = run_to_completion(&mut queue).await;

    assert!(!summary.succeeded);
    assert_eq!(summary.root_result, "Failed");
    assert_eq!(summary.message, "Jenkins pipeline failed");
}

#[tokio::test(start_paused = true)]
async fn test_unstable_result_depends_on_configuration() {
    for (fail_on_unstable, expected) in [(false, true), (true, false)] {
        let server = FakeServer::new();
        server.on_json(&definition_url("root"), &definition(&[], Some(3)));
        script_execution(&server, "root", 3, "flaky\n", "UNSTABLE", 1000);

        let mut options = test_options();
        options.tracking.fail_on_unstable = fail_on_unstable;
        let (mut queue, _) = new_queue(options, &server);
        queue.add_root(&task_url("root"), "root", 3);
        let summary = run_to_completion(&mut queue).await;

        assert_eq!(summary.succeeded, expected);
        assert_eq!(summary.root_result, "Unstable");
    }
}

#[tokio::test(start_paused = true)]
async fn test_result_polled_until_present() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(3)));
    server.on(&console_url("root", 3, 0), console_chunk("done\n", None));
    server.on_json(&result_url("root", 3), r#"{"result":null,"timestamp":1000}"#);
    server.on_json(&result_url("root", 3), r#"{"result":null,"timestamp":1000}"#);
    server.on_json(&result_url("root", 3), &result("SUCCESS", 1000));

    let (mut queue, _) = new_queue(test_options(), &server);
    queue.add_root(&task_url("root"), "root", 3);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(server.hits(&result_url("root", 3)), 3);
}

/// root -> a, b; a -> c; b -> c; c -> d
///
/// c runs once (#12) for both triggers, so the copy under b is joined to the
/// copy under a and b's d is cut.
fn script_diamond(server: &FakeServer) {
    server.on_json(&definition_url("root"), &definition(&["a", "b"], Some(7)));
    server.on_json(&definition_url("a"), &definition(&["c"], Some(3)));
    server.on_json(&definition_url("b"), &definition(&["c"], Some(5)));
    server.on_json(&definition_url("c"), &definition(&["d"], Some(12)));
    server.on_json(&definition_url("d"), &definition(&[], Some(20)));

    script_execution(server, "root", 7, "root log\n", "SUCCESS", 1000);

    server.on_json(&causes_url("a", 3), &causes(&[("root", 7)], 2000));
    // a logs in three chunks so b's single chunk arrives first
    server.on(&console_url("a", 3, 0), console_chunk("a log 1\n", Some(8)));
    server.on(&console_url("a", 3, 8), console_chunk("a log 2\n", Some(16)));
    server.on(&console_url("a", 3, 16), console_chunk("a log 3\n", None));
    server.on_json(&result_url("a", 3), &result("SUCCESS", 2000));

    server.on_json(&causes_url("b", 5), &causes(&[("root", 7)], 2000));
    script_execution(server, "b", 5, "b log\n", "SUCCESS", 2000);

    server.on_json(&causes_url("c", 12), &causes(&[("a", 3), ("b", 5)], 3000));
    script_execution(server, "c", 12, "c log\n", "SUCCESS", 3000);

    server.on_json(&causes_url("d", 20), &causes(&[("c", 12)], 4000));
    script_execution(server, "d", 20, "d log\n", "SUCCESS", 4000);
}

fn find(queue: &jenkins_queue::core::JobQueue, name: &str, parent: &str) -> JobId {
    queue
        .jobs()
        .iter()
        .find(|j| j.name == name && j.parent.map(|p| queue.job(p).name.as_str()) == Some(parent))
        .map(|j| j.id)
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_joins_shared_downstream_execution() {
    let server = FakeServer::new();
    script_diamond(&server);

    let (mut queue, _) = new_queue(test_options(), &server);
    queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded, "{}", summary.message);
    assert_eq!(queue.jobs().len(), 7);

    let c1 = find(&queue, "c", "a");
    let c2 = find(&queue, "c", "b");
    let d1 = find(&queue, "d", "c");
    let d2 = queue.job(c2).children[0];

    assert_eq!(queue.job(c1).state, JobState::Done);
    assert_eq!(queue.job(c1).executable_number, Some(12));
    assert_eq!(queue.job(c2).state, JobState::Joined);
    assert_eq!(queue.job(c2).joined, Some(c1));
    assert_eq!(queue.job(d2).state, JobState::Cut);
    assert_eq!(queue.job(d1).state, JobState::Done);
    assert_eq!(queue.job(d1).executable_number, Some(20));

    // c#12 and d#20 were each streamed once
    assert_eq!(server.hits(&console_url("c", 12, 0)), 1);
    assert_eq!(server.hits(&console_url("d", 20, 0)), 1);
    // the shared definition was fetched once
    assert_eq!(server.hits(&definition_url("c")), 1);

    assert!(summary.report.contains("    - [c #12](http://jenkins/job/c/12) Succeeded"));
}

#[tokio::test(start_paused = true)]
async fn test_console_output_follows_start_order() {
    let server = FakeServer::new();
    script_diamond(&server);

    let (mut queue, sink) = new_queue(test_options(), &server);
    queue.add_root(&task_url("root"), "root", 7);
    run_to_completion(&mut queue).await;

    let output = sink.text();
    let position = |text: &str| output.find(text).unwrap_or_else(|| panic!("missing {:?}", text));
    assert!(position("root log") < position("a log 1"));
    assert!(position("a log 1") < position("a log 2"));
    assert!(position("a log 3") < position("b log"));
    assert!(position("a log 3") < position("Jenkins job started: b"));
    assert!(position("b log") < position("c log"));
    assert!(position("c log") < position("d log"));
}

#[tokio::test(start_paused = true)]
async fn test_search_walks_back_to_matching_build() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&["a"], Some(7)));
    server.on_json(&definition_url("a"), &definition(&[], Some(13)));
    script_execution(&server, "root", 7, "root\n", "SUCCESS", 1000);
    // #13 came from a later root build
    server.on_json(&causes_url("a", 13), &causes(&[("root", 8)], 5000));
    server.on_json(&causes_url("a", 12), &causes(&[("root", 7)], 2000));
    script_execution(&server, "a", 12, "a\n", "SUCCESS", 2000);

    let (mut queue, _) = new_queue(test_options(), &server);
    queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    let a = find(&queue, "a", "root");
    assert_eq!(queue.job(a).executable_number, Some(12));
    assert_eq!(server.hits(&causes_url("a", 13)), 1);
    assert_eq!(server.hits(&causes_url("a", 12)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_search_turns_forward_for_new_builds() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&["a"], Some(7)));
    server.on_json(&definition_url("a"), &definition(&[], Some(4)));
    script_execution(&server, "root", 7, "root\n", "SUCCESS", 1000);
    // #4 predates the root job; a's build for this run has not been created yet
    server.on_json(&causes_url("a", 4), &causes(&[("root", 6)], 500));
    server.on(&causes_url("a", 5), HttpResponse::new(404, "Not Found"));
    server.on_json(&causes_url("a", 5), &causes(&[("root", 7)], 2000));
    script_execution(&server, "a", 5, "a\n", "SUCCESS", 2000);

    let (mut queue, _) = new_queue(test_options(), &server);
    queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    let a = find(&queue, "a", "root");
    assert_eq!(queue.job(a).executable_number, Some(5));
    assert_eq!(server.hits(&causes_url("a", 5)), 2);
    assert_eq!(server.hits(&causes_url("a", 3)), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_downstream_projects_are_ignored() {
    let server = FakeServer::new();
    server.on_json(
        &definition_url("root"),
        r#"{"downstreamProjects":[{"name":"off","url":"http://jenkins/job/off/","color":"disabled"}],"lastBuild":{"number":2}}"#,
    );
    script_execution(&server, "root", 2, "root\n", "SUCCESS", 1000);

    let (mut queue, _) = new_queue(test_options(), &server);
    queue.add_root(&task_url("root"), "root", 2);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(queue.jobs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_resets_exhaust_retries() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    server.on_reset(&console_url("root", 7, 0));

    let mut options = test_options();
    options.tracking.retry_count = 3;
    let (mut queue, sink) = new_queue(options, &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(!summary.succeeded);
    assert_eq!(server.hits(&console_url("root", 7, 0)), 3);
    assert!(queue.job(root).failure.is_some());
    assert_eq!(queue.job(root).state, JobState::Streaming);

    let output = sink.text();
    assert!(output.contains("Connection error. Retrying again in 1 seconds. Retry 1 out of 3"));
    assert!(output.contains("Retry 2 out of 3"));
    assert!(!output.contains("Retry 3 out of 3"));
}

#[tokio::test(start_paused = true)]
async fn test_transient_reset_recovers() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    server.on_reset(&console_url("root", 7, 0));
    server.on(&console_url("root", 7, 0), console_chunk("after reset\n", None));
    server.on_json(&result_url("root", 7), &result("SUCCESS", 1000));

    let (mut queue, sink) = new_queue(test_options(), &server);
    queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert!(sink.text().contains("after reset"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_text_size_continues_after_received_bytes() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    server.on(
        &console_url("root", 7, 0),
        HttpResponse::new(200, "line\n").with_header("X-More-Data", "true"),
    );
    server.on(&console_url("root", 7, 5), console_chunk("rest\n", None));
    server.on_json(&result_url("root", 7), &result("SUCCESS", 1000));

    let (mut queue, sink) = new_queue(test_options(), &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(queue.job(root).state, JobState::Done);
    assert_eq!(server.hits(&console_url("root", 7, 5)), 1);
    assert!(sink.text().contains("line\nrest\n"));
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_result_body_is_retried() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    server.on(&console_url("root", 7, 0), console_chunk("log\n", None));
    server.on_json(&result_url("root", 7), "<html>proxy error</html>");
    server.on_json(&result_url("root", 7), &result("SUCCESS", 1000));

    let (mut queue, _) = new_queue(test_options(), &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(queue.job(root).state, JobState::Done);
    assert_eq!(queue.job(root).retries, 1);
    assert_eq!(server.hits(&result_url("root", 7)), 2);
}

#[tokio::test(start_paused = true)]
async fn test_console_not_found_waits_without_retry() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    server.on(&console_url("root", 7, 0), HttpResponse::new(404, "Not Found"));
    server.on(&console_url("root", 7, 0), console_chunk("late log\n", None));
    server.on_json(&result_url("root", 7), &result("SUCCESS", 1000));

    let (mut queue, sink) = new_queue(test_options(), &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(queue.job(root).state, JobState::Done);
    assert_eq!(queue.job(root).retries, 0);
    assert_eq!(server.hits(&console_url("root", 7, 0)), 2);
    let output = sink.text();
    assert!(output.contains("late log\n"));
    assert!(!output.contains("Connection error"));
}

#[tokio::test(start_paused = true)]
async fn test_console_server_error_is_retried() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    server.on(&console_url("root", 7, 0), HttpResponse::new(500, "Internal Server Error"));
    server.on(&console_url("root", 7, 0), console_chunk("recovered\n", None));
    server.on_json(&result_url("root", 7), &result("SUCCESS", 1000));

    let (mut queue, sink) = new_queue(test_options(), &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(queue.job(root).state, JobState::Done);
    assert_eq!(queue.job(root).retries, 1);
    assert_eq!(server.hits(&console_url("root", 7, 0)), 2);
    let output = sink.text();
    assert!(output.contains("Connection error. Retrying again in 1 seconds. Retry 1 out of"));
    assert!(output.contains("recovered\n"));
}

#[tokio::test(start_paused = true)]
async fn test_result_not_found_or_missing_is_polled_again() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    server.on(&console_url("root", 7, 0), console_chunk("log\n", None));
    server.on(&result_url("root", 7), HttpResponse::new(404, "Not Found"));
    server.on_json(&result_url("root", 7), r#"{"timestamp":1000}"#);
    server.on_json(&result_url("root", 7), &result("SUCCESS", 1000));

    let (mut queue, _) = new_queue(test_options(), &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(queue.job(root).state, JobState::Done);
    assert_eq!(queue.job(root).retries, 0);
    assert_eq!(server.hits(&result_url("root", 7)), 3);
}

#[tokio::test(start_paused = true)]
async fn test_results_download_failure_still_done() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    script_execution(&server, "root", 7, "log\n", "SUCCESS", 1000);
    server.on(&zip_url("root", 7), HttpResponse::new(500, "Internal Server Error"));

    let temp_dir = tempfile::TempDir::new().unwrap();
    let mut options = test_options();
    options.tracking.download_results = true;
    options.tracking.save_results_to = temp_dir.path().to_path_buf();
    let (mut queue, _) = new_queue(options, &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(summary.root_result, "Succeeded");
    assert_eq!(queue.job(root).state, JobState::Done);
    assert_eq!(server.hits(&zip_url("root", 7)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_results_archive_is_done_quietly() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    script_execution(&server, "root", 7, "log\n", "SUCCESS", 1000);
    server.on(&zip_url("root", 7), HttpResponse::new(404, "Not Found"));

    let temp_dir = tempfile::TempDir::new().unwrap();
    let mut options = test_options();
    options.tracking.download_results = true;
    options.tracking.save_results_to = temp_dir.path().to_path_buf();
    let (mut queue, _) = new_queue(options, &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(queue.job(root).state, JobState::Done);
    assert_eq!(queue.job(root).retries, 0);
    assert_eq!(server.hits(&zip_url("root", 7)), 1);
    assert!(!temp_dir.path().join("root").exists());
}

#[tokio::test(start_paused = true)]
async fn test_results_downloaded_and_extracted() {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("junit.xml", SimpleFileOptions::default()).unwrap();
    writer.write_all(b"<testsuite tests=\"1\"/>").unwrap();
    let archive = writer.finish().unwrap().into_inner();

    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    script_execution(&server, "root", 7, "log\n", "SUCCESS", 1000);
    server.on(&zip_url("root", 7), HttpResponse::new(200, archive));

    let temp_dir = tempfile::TempDir::new().unwrap();
    let mut options = test_options();
    options.tracking.download_results = true;
    options.tracking.save_results_to = temp_dir.path().to_path_buf();
    let (mut queue, _) = new_queue(options, &server);
    queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    let extracted = temp_dir.path().join("root").join("junit.xml");
    assert_eq!(std::fs::read_to_string(extracted).unwrap(), "<testsuite tests=\"1\"/>");
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_console_stops_tracking() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    server.on(&console_url("root", 7, 0), HttpResponse::new(401, "Unauthorized"));

    let (mut queue, _) = new_queue(test_options(), &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(!summary.succeeded);
    assert_eq!(queue.job(root).state, JobState::Queued);
    assert!(!queue.flags().capture_console);
    assert!(!queue.flags().capture_pipeline);
    assert!(summary.message.ends_with("Job progress tracking failed to read job progress"));
    assert_eq!(server.hits(&result_url("root", 7)), 0);
}

#[tokio::test(start_paused = true)]
async fn test_without_console_job_is_only_queued() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&["a"], Some(7)));

    let mut options = test_options();
    options.tracking.capture_console = false;
    let (mut queue, sink) = new_queue(options, &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(summary.succeeded);
    assert_eq!(summary.message, "Jenkins job queued");
    assert_eq!(summary.root_result, "Queued");
    assert_eq!(queue.job(root).state, JobState::Queued);
    // pipeline capture is off with the console, so a is never registered
    assert_eq!(queue.jobs().len(), 1);
    assert!(sink.text().is_empty());
    assert_eq!(server.hits(&console_url("root", 7, 0)), 0);
}

#[tokio::test(start_paused = true)]
async fn test_killed_when_result_unreadable() {
    let server = FakeServer::new();
    server.on_json(&definition_url("root"), &definition(&[], Some(7)));
    server.on(&console_url("root", 7, 0), console_chunk("log\n", None));
    server.on(&result_url("root", 7), HttpResponse::new(403, "Forbidden"));

    let (mut queue, _) = new_queue(test_options(), &server);
    let root = queue.add_root(&task_url("root"), "root", 7);
    let summary = run_to_completion(&mut queue).await;

    assert!(!summary.succeeded);
    assert_eq!(queue.job(root).state, JobState::Killed);
    assert_eq!(summary.root_result, "Unknown");
}
