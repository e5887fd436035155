//! In-process fakes of the external collaborators.
//!
//! The fakes write real (tiny) WAV files where later stages read them, so
//! stem mixing runs for real in pipeline tests.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::config::Settings;
use crate::device::DeviceContext;
use crate::logging::{JobLogger, LogConfig};
use crate::models::{Backend, JobRequest, Stem};
use crate::orchestrator::types::Context;
use crate::tools::{
    ChunkStems, Downloader, DownloadedMedia, MediaInfo, MediaToolkit, RawWord, Separator,
    ToolError, ToolResult, Toolbox, Transcriber, VideoMux,
};

pub(crate) const TEST_RATE: u32 = 44_100;

/// Write a stereo 32-bit float WAV.
pub(crate) fn write_test_wav(path: &Path, samples: &[f32]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

fn copy_or_write(input: &Path, output: &Path) -> ToolResult<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| ToolError::io("creating output dir", e))?;
    }
    if input.is_file() {
        fs::copy(input, output).map_err(|e| ToolError::io("copying", e))?;
    } else {
        fs::write(output, b"fake").map_err(|e| ToolError::io("writing", e))?;
    }
    Ok(())
}

/// Media toolkit that copies files around instead of transcoding.
pub(crate) struct FakeMedia {
    info: MediaInfo,
    fail_filters: bool,
    fail_encode: bool,
    filter_calls: Mutex<Vec<Vec<String>>>,
    encode_calls: Mutex<Vec<String>>,
    mux_calls: Mutex<Vec<(Option<PathBuf>, f64)>>,
}

impl Default for FakeMedia {
    fn default() -> Self {
        Self::with_info(MediaInfo {
            duration_secs: 10.0,
            has_video: false,
        })
    }
}

impl FakeMedia {
    pub(crate) fn with_info(info: MediaInfo) -> Self {
        Self {
            info,
            fail_filters: false,
            fail_encode: false,
            filter_calls: Mutex::new(Vec::new()),
            encode_calls: Mutex::new(Vec::new()),
            mux_calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_filters() -> Self {
        Self {
            fail_filters: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_encode() -> Self {
        Self {
            fail_encode: true,
            ..Self::default()
        }
    }

    pub(crate) fn filter_calls(&self) -> Vec<Vec<String>> {
        self.filter_calls.lock().clone()
    }

    /// Codecs passed to `encode_audio`, in call order.
    pub(crate) fn encode_calls(&self) -> Vec<String> {
        self.encode_calls.lock().clone()
    }

    /// Subtitle path and tempo of each video mux.
    pub(crate) fn mux_calls(&self) -> Vec<(Option<PathBuf>, f64)> {
        self.mux_calls.lock().clone()
    }
}

impl MediaToolkit for FakeMedia {
    fn probe(&self, _media: &Path, _logger: &JobLogger) -> ToolResult<MediaInfo> {
        Ok(self.info)
    }

    fn extract_audio(
        &self,
        _input: &Path,
        output: &Path,
        _sample_rate: u32,
        _logger: &JobLogger,
    ) -> ToolResult<()> {
        write_test_wav(output, &[0.1; 64]);
        Ok(())
    }

    fn split_segment(
        &self,
        _input: &Path,
        output: &Path,
        _start_secs: f64,
        _duration_secs: f64,
        _logger: &JobLogger,
    ) -> ToolResult<()> {
        write_test_wav(output, &[0.1; 32]);
        Ok(())
    }

    fn concat(&self, inputs: &[PathBuf], output: &Path, _logger: &JobLogger) -> ToolResult<()> {
        let first = inputs
            .first()
            .ok_or_else(|| ToolError::output("fake-concat", "no inputs"))?;
        copy_or_write(first, output)
    }

    fn apply_audio_filters(
        &self,
        input: &Path,
        output: &Path,
        filters: &[String],
        _logger: &JobLogger,
    ) -> ToolResult<()> {
        self.filter_calls.lock().push(filters.to_vec());
        if self.fail_filters {
            fs::write(output, b"half").map_err(|e| ToolError::io("writing", e))?;
            return Err(ToolError::failed("fake-ffmpeg", 1, "filter graph rejected"));
        }
        copy_or_write(input, output)
    }

    fn encode_audio(
        &self,
        input: &Path,
        output: &Path,
        codec: &str,
        _logger: &JobLogger,
    ) -> ToolResult<()> {
        self.encode_calls.lock().push(codec.to_string());
        if self.fail_encode {
            return Err(ToolError::failed("fake-ffmpeg", 1, "encoder missing"));
        }
        copy_or_write(input, output)
    }

    fn mux_video(&self, request: &VideoMux<'_>, _logger: &JobLogger) -> ToolResult<()> {
        self.mux_calls
            .lock()
            .push((request.subtitles.map(Path::to_path_buf), request.tempo));
        if self.fail_encode {
            return Err(ToolError::failed("fake-ffmpeg", 1, "muxer failed"));
        }
        fs::write(request.output, b"video").map_err(|e| ToolError::io("writing", e))
    }
}

/// Separator writing four small stems per chunk.
pub(crate) struct FakeSeparator {
    fail_on: Option<Backend>,
    fail_call: Option<usize>,
    calls: AtomicUsize,
    backends: Mutex<Vec<Backend>>,
}

impl FakeSeparator {
    pub(crate) fn new() -> Self {
        Self {
            fail_on: None,
            fail_call: None,
            calls: AtomicUsize::new(0),
            backends: Mutex::new(Vec::new()),
        }
    }

    /// Fails every attempt on `backend`.
    pub(crate) fn failing_on(backend: Backend) -> Self {
        Self {
            fail_on: Some(backend),
            ..Self::new()
        }
    }

    /// Fails every attempt on any backend.
    pub(crate) fn always_failing() -> Self {
        Self {
            fail_call: Some(0),
            ..Self::new()
        }
    }

    /// Fails only the `n`th call (1-based) over the fake's lifetime.
    pub(crate) fn failing_on_call(n: usize) -> Self {
        Self {
            fail_call: Some(n),
            ..Self::new()
        }
    }

    pub(crate) fn backends_seen(&self) -> Vec<Backend> {
        self.backends.lock().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn should_fail(&self, call: usize, backend: Backend) -> bool {
        match (self.fail_on, self.fail_call) {
            (Some(b), _) if b == backend => true,
            (_, Some(0)) => true,
            (_, Some(n)) => n == call,
            _ => false,
        }
    }
}

impl Default for FakeSeparator {
    fn default() -> Self {
        Self::new()
    }
}

impl Separator for FakeSeparator {
    fn separate(
        &self,
        chunks: &[PathBuf],
        out_dir: &Path,
        backend: Backend,
        _logger: &JobLogger,
        progress: &mut dyn FnMut(u32),
    ) -> ToolResult<Vec<ChunkStems>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.backends.lock().push(backend);
        progress(50);
        if self.should_fail(call, backend) {
            return Err(ToolError::failed("fake-demucs", 1, "out of device memory"));
        }

        let levels = [
            (Stem::Vocals, 0.1f32),
            (Stem::Drums, 0.2),
            (Stem::Bass, 0.05),
            (Stem::Other, 0.1),
        ];
        let mut result = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let chunk_name = chunk
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "chunk".to_string());
            let dir = out_dir.join(chunk_name);
            let mut stems = ChunkStems::new();
            for (stem, level) in levels {
                let path = dir.join(format!("{}.wav", stem));
                write_test_wav(&path, &[level; 32]);
                stems.insert(stem, path);
            }
            result.push(stems);
        }
        progress(100);
        Ok(result)
    }
}

/// Transcriber returning a fixed word list.
pub(crate) struct FakeTranscriber {
    words: Vec<RawWord>,
    fail_on: Option<Backend>,
    calls: AtomicUsize,
}

impl FakeTranscriber {
    pub(crate) fn with_words(words: Vec<RawWord>) -> Self {
        Self {
            words,
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_on(mut self, backend: Backend) -> Self {
        self.fail_on = Some(backend);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeTranscriber {
    fn default() -> Self {
        let word = |text: &str, start: f64, end: f64, segment: usize| RawWord {
            text: text.to_string(),
            start,
            end,
            segment,
        };
        Self::with_words(vec![
            word("never", 1.0, 1.4, 0),
            word("gonna", 1.4, 1.8, 0),
            word("give", 1.8, 2.1, 0),
            word("you", 2.1, 2.4, 0),
            word("up", 2.4, 3.0, 0),
            word("never", 4.0, 4.4, 1),
            word("gonna", 4.4, 4.8, 1),
            word("let", 4.8, 5.1, 1),
            word("you", 5.1, 5.4, 1),
            word("down", 5.4, 6.0, 1),
        ])
    }
}

impl Transcriber for FakeTranscriber {
    fn transcribe(
        &self,
        _audio: &Path,
        _model: crate::models::ModelSize,
        backend: Backend,
        _work_dir: &Path,
        _logger: &JobLogger,
    ) -> ToolResult<Vec<RawWord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(backend) {
            return Err(ToolError::failed("fake-transcriber", 1, "device lost"));
        }
        Ok(self.words.clone())
    }
}

/// Downloader writing placeholder media; can fail a set number of times.
pub(crate) struct FakeDownloader {
    title: String,
    with_video: bool,
    failures: Mutex<VecDeque<String>>,
    attempts: AtomicUsize,
}

impl FakeDownloader {
    pub(crate) fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            with_video: false,
            failures: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_video(mut self) -> Self {
        self.with_video = true;
        self
    }

    /// Fail the next `n` attempts.
    pub(crate) fn failing(self, n: usize) -> Self {
        {
            let mut failures = self.failures.lock();
            for i in 0..n {
                failures.push_back(format!("HTTP Error 503 (attempt {})", i + 1));
            }
        }
        self
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for FakeDownloader {
    fn default() -> Self {
        Self::new("Remote Song")
    }
}

impl Downloader for FakeDownloader {
    fn download(
        &self,
        _url: &str,
        dest_dir: &Path,
        _logger: &JobLogger,
    ) -> ToolResult<DownloadedMedia> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failures.lock().pop_front() {
            return Err(ToolError::failed("fake-yt-dlp", 1, message));
        }
        let audio = dest_dir.join("audio.m4a");
        fs::write(&audio, b"audio").map_err(|e| ToolError::io("writing", e))?;
        let video = if self.with_video {
            let video = dest_dir.join("video.mp4");
            fs::write(&video, b"video").map_err(|e| ToolError::io("writing", e))?;
            Some(video)
        } else {
            None
        };
        Ok(DownloadedMedia {
            audio,
            video,
            title: self.title.clone(),
        })
    }
}

/// One fake of each collaborator, shared with the toolbox handed out.
#[derive(Clone)]
pub(crate) struct FakeTools {
    pub downloader: Arc<FakeDownloader>,
    pub separator: Arc<FakeSeparator>,
    pub transcriber: Arc<FakeTranscriber>,
    pub media: Arc<FakeMedia>,
}

impl Default for FakeTools {
    fn default() -> Self {
        Self {
            downloader: Arc::new(FakeDownloader::default()),
            separator: Arc::new(FakeSeparator::new()),
            transcriber: Arc::new(FakeTranscriber::default()),
            media: Arc::new(FakeMedia::default()),
        }
    }
}

impl FakeTools {
    pub(crate) fn with_media(mut self, media: FakeMedia) -> Self {
        self.media = Arc::new(media);
        self
    }

    pub(crate) fn with_separator(mut self, separator: FakeSeparator) -> Self {
        self.separator = Arc::new(separator);
        self
    }

    pub(crate) fn with_transcriber(mut self, transcriber: FakeTranscriber) -> Self {
        self.transcriber = Arc::new(transcriber);
        self
    }

    pub(crate) fn with_downloader(mut self, downloader: FakeDownloader) -> Self {
        self.downloader = Arc::new(downloader);
        self
    }

    pub(crate) fn toolbox(&self) -> Toolbox {
        Toolbox {
            downloader: self.downloader.clone(),
            separator: self.separator.clone(),
            transcriber: self.transcriber.clone(),
            media: self.media.clone(),
        }
    }
}

/// Settings rooted in `root`, with no download back-off.
pub(crate) fn test_settings(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.paths.output_folder = root.join("out").to_string_lossy().to_string();
    settings.paths.temp_root = root.join("temp").to_string_lossy().to_string();
    settings.paths.logs_folder = root.join("logs").to_string_lossy().to_string();
    settings.download.retry_delay_ms = 0;
    settings
}

/// Write a local source file under `root` and return its path.
pub(crate) fn test_source(root: &Path, name: &str) -> PathBuf {
    let path = root.join(name);
    write_test_wav(&path, &[0.2; 64]);
    path
}

/// Context for `request` running on the general processor.
pub(crate) fn context_for(
    dir: &TempDir,
    request: JobRequest,
    tools: &FakeTools,
    backend: Backend,
) -> Context {
    let settings = test_settings(dir.path());
    let config = request.into_config(&dir.path().join("out")).unwrap();
    let work_dir = dir.path().join("work");
    fs::create_dir_all(&work_dir).unwrap();
    Context::new(
        config,
        settings,
        "job-0001",
        work_dir,
        Arc::new(JobLogger::detached("job-0001", LogConfig::default())),
        tools.toolbox(),
        DeviceContext::new(backend),
    )
}

/// A context over a local source with all-default fakes.
pub(crate) fn test_context() -> (TempDir, Context) {
    let dir = tempfile::tempdir().unwrap();
    let source = test_source(dir.path(), "Song.wav");
    let request = JobRequest::new(source.to_string_lossy());
    let ctx = context_for(&dir, request, &FakeTools::default(), Backend::General);
    (dir, ctx)
}
