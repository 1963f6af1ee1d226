use std::io::Write;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use hashforge_client_engine::JobSummary;

use crate::format::{format_hashrate, format_number};

#[derive(Debug, Default)]
struct StatusLine {
    job_id: Option<u64>,
    hashes_done: u64,
    hashes_per_sec: u64,
    accepted: u64,
    rejected: u64,
}

impl StatusLine {
    fn render(&self) -> String {
        let totals = format!("accepted {} / rejected {}", self.accepted, self.rejected);
        match self.job_id {
            Some(job_id) => format!(
                "Job {job_id}: {} hashes, {} ({totals})",
                format_number(self.hashes_done),
                format_hashrate(self.hashes_per_sec)
            ),
            None => format!("Waiting for work ({totals})"),
        }
    }
}

pub(crate) struct Ui {
    mp: MultiProgress,
    status_pb: ProgressBar,
    stop_pb: ProgressBar,
    status: StatusLine,
}

impl Ui {
    pub(crate) fn new() -> Self {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stdout());
        mp.set_move_cursor(true);

        let style = ProgressStyle::with_template("{spinner} {msg}\u{1b}[0K")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let status_pb = mp.add(ProgressBar::new_spinner());
        status_pb.set_style(style);

        let stop_style = ProgressStyle::with_template("{msg}\u{1b}[0K")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let stop_pb = mp.add(ProgressBar::new(0));
        stop_pb.set_style(stop_style);
        stop_pb.set_message(" ");

        let ui = Self {
            mp,
            status_pb,
            stop_pb,
            status: StatusLine::default(),
        };
        ui.redraw();
        ui
    }

    fn redraw(&self) {
        self.status_pb.set_message(self.status.render());
    }

    pub(crate) fn println(&self, msg: &str) {
        let _ = self.mp.println(msg);
    }

    pub(crate) fn set_job(&mut self, job: &JobSummary) {
        self.status.job_id = Some(job.job_id);
        self.status.hashes_done = 0;
        self.redraw();
    }

    pub(crate) fn set_progress(&mut self, hashes_done: u64, hashes_per_sec: u64) {
        self.status.hashes_done = hashes_done;
        self.status.hashes_per_sec = hashes_per_sec;
        self.redraw();
    }

    pub(crate) fn set_idle(&mut self) {
        self.status.job_id = None;
        self.redraw();
    }

    pub(crate) fn set_totals(&mut self, accepted: u64, rejected: u64) {
        self.status.accepted = accepted;
        self.status.rejected = rejected;
        self.redraw();
    }

    pub(crate) fn tick(&self) {
        self.status_pb.tick();
    }

    pub(crate) fn set_stop_message(&mut self, msg: &str) {
        self.stop_pb.set_message(msg.to_string());
    }

    pub(crate) fn freeze(&self) {
        self.mp.set_move_cursor(false);
        self.status_pb.abandon();
        self.stop_pb.abandon();
        let _ = std::io::stdout().write_all(b"\n");
    }
}
