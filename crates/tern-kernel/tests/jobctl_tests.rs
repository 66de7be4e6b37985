//! Job controller contract: state transitions and error kinds, checked on
//! the in-memory controller and, on unix, against real process groups.

use tern_kernel::jobctl::{JobController, MemoryController};
use tern_types::{JobError, JobId, JobState, ProcessStatus};

// ============================================================================
// Contract, on fake processes
// ============================================================================

#[test]
fn control_needs_a_process() {
    let jobs = MemoryController::new();
    let id = jobs.create_job().unwrap();
    assert_eq!(jobs.inspect(id).unwrap().state, JobState::Created);
    assert_eq!(jobs.bring_to_foreground(id), Err(JobError::InvalidId));
    assert_eq!(jobs.suspend_job(id), Err(JobError::InvalidId));
    assert_eq!(jobs.wait_for_job(id), Err(JobError::InvalidId));
    assert_eq!(jobs.terminate_job(id), Err(JobError::InvalidId));
    // an empty job can still be released
    jobs.release_job(id).unwrap();
    assert_eq!(jobs.inspect(id), Err(JobError::NotFound));
}

#[test]
fn unknown_ids_are_not_found() {
    let jobs = MemoryController::new();
    let ghost = JobId::from_raw(99);
    assert_eq!(jobs.add_process(ghost, jobs.spawn_fake(None)), Err(JobError::NotFound));
    assert_eq!(jobs.resume_job(ghost), Err(JobError::NotFound));
    assert_eq!(jobs.release_job(ghost), Err(JobError::NotFound));
}

#[test]
fn ids_are_never_reused() {
    let jobs = MemoryController::new();
    let a = jobs.create_job().unwrap();
    jobs.release_job(a).unwrap();
    let b = jobs.create_job().unwrap();
    assert_ne!(a, b);
}

#[test]
fn processes_must_share_the_group() {
    let jobs = MemoryController::new();
    let id = jobs.create_job().unwrap();
    let leader = jobs.spawn_fake(None);
    let member = jobs.spawn_fake(Some(leader));
    let stranger = jobs.spawn_fake(None);
    jobs.add_process(id, leader).unwrap();
    jobs.add_process(id, member).unwrap();
    assert_eq!(jobs.add_process(id, stranger), Err(JobError::ProcessNotInJob));

    let snap = jobs.inspect(id).unwrap();
    assert_eq!(snap.state, JobState::Populated);
    assert_eq!(snap.group, Some(i64::from(leader)));
    assert_eq!(snap.pids, vec![leader, member]);
}

#[test]
fn completed_jobs_say_so() {
    let jobs = MemoryController::new();
    let id = jobs.create_job().unwrap();
    let pid = jobs.spawn_fake(None);
    jobs.add_process(id, pid).unwrap();
    jobs.script_exit(pid, ProcessStatus::signaled(pid, 9));
    assert_eq!(jobs.wait_for_job(id).unwrap(), vec![ProcessStatus::signaled(pid, 9)]);
    assert_eq!(jobs.resume_job(id), Err(JobError::AlreadyTerminated));
    assert_eq!(jobs.get_job_processes(id), Err(JobError::AlreadyTerminated));
}

#[test]
fn terminated_jobs_are_gone() {
    let jobs = MemoryController::new();
    let id = jobs.create_job().unwrap();
    jobs.add_process(id, jobs.spawn_fake(None)).unwrap();
    jobs.terminate_job(id).unwrap();
    assert_eq!(jobs.inspect(id), Err(JobError::NotFound));
}

#[test]
fn state_follows_control() {
    let jobs = MemoryController::new();
    let id = jobs.create_job().unwrap();
    jobs.add_process(id, jobs.spawn_fake(None)).unwrap();
    let state = |jobs: &MemoryController| jobs.inspect(id).unwrap().state;

    jobs.bring_to_foreground(id).unwrap();
    assert_eq!(state(&jobs), JobState::Foreground);
    jobs.suspend_job(id).unwrap();
    assert_eq!(state(&jobs), JobState::Suspended);
    jobs.resume_job(id).unwrap();
    assert_eq!(state(&jobs), JobState::Background);
    jobs.bring_to_foreground(id).unwrap();
    jobs.send_to_background(id).unwrap();
    assert_eq!(state(&jobs), JobState::Background);
}

#[test]
fn close_forgets_everything_and_is_repeatable() {
    let jobs = MemoryController::new();
    let a = jobs.create_job().unwrap();
    let b = jobs.create_job().unwrap();
    jobs.add_process(b, jobs.spawn_fake(None)).unwrap();
    jobs.close().unwrap();
    jobs.close().unwrap();
    assert_eq!(jobs.inspect(a), Err(JobError::NotFound));
    assert_eq!(jobs.inspect(b), Err(JobError::NotFound));
}

// ============================================================================
// Real process groups
// ============================================================================

#[cfg(unix)]
mod process_groups {
    use std::os::unix::process::CommandExt;
    use std::process::{Child, Command};

    use tern_kernel::jobctl::ProcessGroupController;

    use super::*;

    /// `sh -c script` leading a new process group.
    fn spawn_leader(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .process_group(0)
            .spawn()
            .expect("spawn sh")
    }

    #[test]
    fn wait_reports_exit_codes() {
        let jobs = ProcessGroupController::new();
        let id = jobs.create_job().unwrap();
        let child = spawn_leader("sleep 0.1; exit 3");
        let pid = child.id();
        jobs.add_process(id, pid).unwrap();
        assert_eq!(jobs.inspect(id).unwrap().group, Some(i64::from(pid)));

        let statuses = jobs.wait_for_job(id).unwrap();
        assert_eq!(statuses, vec![ProcessStatus::exited(pid, 3)]);
        assert_eq!(jobs.get_job_processes(id), Err(JobError::AlreadyTerminated));
    }

    #[test]
    fn suspend_resume_terminate() {
        let jobs = ProcessGroupController::new();
        let id = jobs.create_job().unwrap();
        let mut child = spawn_leader("sleep 30");
        jobs.add_process(id, child.id()).unwrap();

        jobs.suspend_job(id).unwrap();
        assert_eq!(jobs.inspect(id).unwrap().state, JobState::Suspended);
        jobs.resume_job(id).unwrap();
        assert_eq!(jobs.inspect(id).unwrap().state, JobState::Background);
        jobs.terminate_job(id).unwrap();
        assert_eq!(jobs.inspect(id), Err(JobError::NotFound));

        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn a_process_in_another_group_is_rejected() {
        let jobs = ProcessGroupController::new();
        let id = jobs.create_job().unwrap();
        let mut a = spawn_leader("sleep 30");
        let mut b = spawn_leader("sleep 30");
        jobs.add_process(id, a.id()).unwrap();
        assert_eq!(jobs.add_process(id, b.id()), Err(JobError::ProcessNotInJob));

        jobs.terminate_job(id).unwrap();
        let _ = b.kill();
        let _ = a.wait();
        let _ = b.wait();
    }
}
