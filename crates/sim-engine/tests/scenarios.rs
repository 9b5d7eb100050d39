//! End-to-end simulations over small hand-built workloads.

use std::path::PathBuf;

use swfsim_core::{Job, SimConfig, Trace, swf};
use swfsim_engine::{AnyScheduler, Notice, Simulator};

fn config(json: &str) -> SimConfig {
    let config: SimConfig = serde_json::from_str(json).unwrap();
    config.validate().unwrap();
    config
}

fn easy_reqtime() -> SimConfig {
    config(
        r#"{
          "scheduler": {
            "name": "easy_backfill",
            "predictor": { "name": "reqtime" },
            "corrector": { "name": "reqtime" }
          }
        }"#,
    )
}

fn run(sim: &mut Simulator) {
    sim.run(|_| {}).unwrap();
}

fn job(id: u64, submit: i64, procs: u32, actual: i64, requested: i64) -> Job {
    Job::new(id, submit, procs, actual, requested, 1, 1, 1)
}

#[test]
fn single_job_trace() {
    let cfg = easy_reqtime();
    let scheduler = AnyScheduler::from_config(&cfg, 4, None).unwrap();
    let mut sim = Simulator::new(4, scheduler);
    sim.submit(job(1, 0, 4, 100, 200));
    run(&mut sim);

    let results = sim.results();
    let j = results[0];
    assert_eq!(j.start_time, Some(0));
    assert_eq!(j.wait_time(), Some(0));
    assert_eq!(j.num_underpredict, 0);
    assert_eq!(j.initial_prediction, Some(200));
}

#[test]
fn single_job_swf_round_trip() {
    let input = "\
; MaxProcs: 4
1 0 -1 100 4 -1 -1 4 200 -1 1 1 1 1 0 0 -1 -1
";
    let trace = Trace::parse(input.as_bytes()).unwrap();
    let capacity = trace.max_procs.unwrap();

    let cfg = easy_reqtime();
    let scheduler = AnyScheduler::from_config(&cfg, capacity, None).unwrap();
    let mut sim = Simulator::new(capacity, scheduler);
    for job in trace.jobs {
        sim.submit(job);
    }
    run(&mut sim);

    let out = std::env::temp_dir().join(format!("swfsim-scenario1-{}.swf", std::process::id()));
    swf::write_output(&out, capacity, &sim.results()).unwrap();
    let written = std::fs::read_to_string(&out).unwrap();
    std::fs::remove_file(&out).ok();

    let row: Vec<&str> = written
        .lines()
        .find(|l| !l.starts_with(';'))
        .unwrap()
        .split_whitespace()
        .collect();
    assert_eq!(row[2], "0"); // wait
    assert_eq!(row[3], "100"); // run time
    assert_eq!(row[16], "0"); // under-predictions
    assert_eq!(row[17], "200"); // initial prediction
}

#[test]
fn head_of_line_blocking_with_backfill() {
    let cfg = easy_reqtime();
    let scheduler = AnyScheduler::from_config(&cfg, 4, None).unwrap();
    let mut sim = Simulator::new(4, scheduler);
    sim.submit(job(1, 0, 4, 1000, 1000));
    sim.submit(job(2, 0, 4, 10, 1000));
    sim.submit(job(3, 0, 1, 5, 1000));
    run(&mut sim);

    let results = sim.results();
    // Job 1 holds the whole machine until 1000, so nothing backfills.
    assert_eq!(results[0].start_time, Some(0));
    assert_eq!(results[1].wait_time(), Some(1000));
    // Job 3 must additionally wait for job 2 to finish.
    assert_eq!(results[2].wait_time(), Some(1010));
    assert!(!results[2].backfilled);
}

#[test]
fn narrow_job_backfills_around_a_reservation() {
    let cfg = easy_reqtime();
    let scheduler = AnyScheduler::from_config(&cfg, 4, None).unwrap();
    let mut sim = Simulator::new(4, scheduler);
    sim.submit(job(1, 0, 2, 1000, 1000));
    sim.submit(job(2, 0, 4, 10, 1000));
    sim.submit(job(3, 0, 2, 500, 500));
    run(&mut sim);

    let results = sim.results();
    assert_eq!(results[0].start_time, Some(0));
    // Job 3 ends by 500, before job 2's reservation at 1000.
    assert_eq!(results[2].start_time, Some(0));
    assert!(results[2].backfilled);
    assert_eq!(results[1].start_time, Some(1000));
}

#[test]
fn under_prediction_cycle() {
    let cfg = config(
        r#"{
          "scheduler": {
            "name": "easy_backfill",
            "predictor": { "name": "exact", "sigma_factor": 0.0 },
            "corrector": { "name": "reqtime" }
          }
        }"#,
    );
    let scheduler = AnyScheduler::from_config(&cfg, 4, None).unwrap();
    let mut sim = Simulator::new(4, scheduler);
    // Two seed jobs teach the exact tag a 50s average.
    sim.submit(job(10, 0, 4, 50, 300));
    sim.submit(job(11, 0, 4, 50, 300));
    // The measured job really runs 200s.
    sim.submit(job(1, 200, 4, 200, 300));
    run(&mut sim);

    let results = sim.results();
    let measured = results.iter().find(|j| j.id == 1).unwrap();
    assert_eq!(measured.start_time, Some(200));
    assert_eq!(measured.initial_prediction, Some(50));
    // Exactly one under-prediction fired (at 250); the reqtime corrector
    // revised the prediction to 300 and the true termination came at 400.
    assert_eq!(measured.num_underpredict, 1);
    assert_eq!(measured.predicted_run_time(), 300);
}

#[test]
fn cp_best_of_n_prefers_the_sjf_plan_under_af() {
    let cfg = config(
        r#"{
          "scheduler": {
            "name": "cp_best_of_n",
            "objective_function": "AF",
            "scheduling_timelimit": 0.05,
            "alternative_presorter": ["SJF"],
            "predictor": { "name": "clairvoyant" },
            "corrector": { "name": "reqtime" }
          }
        }"#,
    );
    let scheduler = AnyScheduler::from_config(&cfg, 2, None).unwrap();
    let mut sim = Simulator::new(2, scheduler);
    sim.submit(job(1, 0, 2, 10, 10));
    sim.submit(job(2, 0, 1, 5, 5));
    run(&mut sim);

    let results = sim.results();
    assert_eq!(results[1].start_time, Some(0));
    assert_eq!(results[0].start_time, Some(5));
}

fn journal_config() -> SimConfig {
    config(
        r#"{
          "use_checkpointing": true,
          "scheduler": {
            "name": "cp_tuned",
            "objective_function": "AF",
            "scheduling_timelimit": 0.05,
            "predictor": { "name": "clairvoyant" },
            "corrector": { "name": "reqtime" }
          }
        }"#,
    )
}

fn journal_workload(sim: &mut Simulator) {
    sim.submit(job(7, 0, 2, 120, 200));
    sim.submit(job(3, 0, 2, 120, 200));
    sim.submit(job(11, 100, 2, 50, 100));
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("swfsim-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn journal_fast_forward_replays_identical_workloads() {
    let dir = scratch("journal-replay");
    let out = dir.join("out.swf");
    let cfg = journal_config();

    // First run writes the journal.
    let scheduler = AnyScheduler::from_config(&cfg, 4, Some(&out)).unwrap();
    let mut sim = Simulator::new(4, scheduler);
    journal_workload(&mut sim);
    run(&mut sim);
    let journal = std::fs::read_to_string(dir.join("out.swf.journal")).unwrap();
    assert_eq!(journal, "0,7\n0,3\n120,11\n");

    // Second run replays it; starts must be byte-identical.
    let scheduler = AnyScheduler::from_config(&cfg, 4, Some(&out)).unwrap();
    let mut sim = Simulator::new(4, scheduler);
    journal_workload(&mut sim);
    let mut starts = Vec::new();
    sim.run(|n| {
        if let Notice::JobStarted { job, time } = n {
            starts.push((time, job));
        }
    })
    .unwrap();
    assert_eq!(starts, vec![(0, 7), (0, 3), (120, 11)]);
    // The saved journal was consumed and a fresh one rewritten.
    assert!(!dir.join("out.swf.journal.saved").exists());
    let rewritten = std::fs::read_to_string(dir.join("out.swf.journal")).unwrap();
    assert_eq!(rewritten, "0,7\n0,3\n120,11\n");
}

#[test]
fn journal_inconsistency_aborts_fast_forward_and_resumes_solving() {
    let dir = scratch("journal-abort");
    let out = dir.join("out.swf");
    // Job 99 is never submitted: replay must abort on it and the solver
    // must still schedule everything.
    std::fs::write(dir.join("out.swf.journal"), "0,7\n0,99\n120,11\n").unwrap();

    let cfg = journal_config();
    let scheduler = AnyScheduler::from_config(&cfg, 4, Some(&out)).unwrap();
    let mut sim = Simulator::new(4, scheduler);
    journal_workload(&mut sim);
    run(&mut sim);

    let results = sim.results();
    // Job 7 was replayed; the rest were scheduled normally.
    for j in &results {
        assert!(j.start_time.is_some(), "job {} never ran", j.id);
    }
    assert_eq!(results[0].start_time, Some(0));
    assert_eq!(results[1].start_time, Some(0));
    assert_eq!(results[2].start_time, Some(120));
}
