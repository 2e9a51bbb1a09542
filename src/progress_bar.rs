use log::LevelFilter;

enum Bar {
    Hidden,
    Terminal(indicatif::ProgressBar),
    Log(logbar::ProgressBar),
}

/// Progress indicator for event loops
///
/// The exact format is decided at run time depending on whether we are
/// writing to an interactive terminal or a non-interactive output.
/// Nothing is shown unless the log level is `info`. While the bar is
/// drawn, logging is disabled.
pub struct ProgressBar {
    bar: Bar,
    saved_level: Option<LevelFilter>,
}

impl ProgressBar {
    /// A new progress bar with the given maximum progress and message
    pub fn new(len: u64, message: &str) -> Self {
        let level = log::max_level();
        let bar = if level != LevelFilter::Info {
            Bar::Hidden
        } else if console::Term::stderr().features().is_attended() {
            let bar = indicatif::ProgressBar::new(len);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{bar:60.cyan/cyan} {msg} {pos}/{len} [{elapsed}]")
            {
                bar.set_style(style);
            }
            bar.set_message(message.to_owned());
            Bar::Terminal(bar)
        } else {
            eprintln!("{message}");
            let style = logbar::Style::new().indicator('█');
            Bar::Log(logbar::ProgressBar::with_style(len as usize, style))
        };
        let saved_level = match bar {
            Bar::Hidden => None,
            _ => {
                log::set_max_level(LevelFilter::Off);
                Some(level)
            }
        };
        Self { bar, saved_level }
    }

    pub fn inc(&self, i: u64) {
        match &self.bar {
            Bar::Hidden => {}
            Bar::Terminal(bar) => bar.inc(i),
            Bar::Log(bar) => bar.inc(i as usize),
        }
    }

    /// Complete the bar and restore logging
    pub fn finish(&mut self) {
        match &self.bar {
            Bar::Hidden => {}
            Bar::Terminal(bar) => bar.finish(),
            Bar::Log(bar) => bar.finish(),
        }
        if let Some(level) = self.saved_level.take() {
            log::set_max_level(level);
        }
    }
}

impl Drop for ProgressBar {
    fn drop(&mut self) {
        if let Some(level) = self.saved_level.take() {
            log::set_max_level(level);
        }
    }
}
