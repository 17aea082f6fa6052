//! Policy connections
//!
//! Three ways for the referee to reach a policy:
//!
//! - [`LineChannel`]: the text protocol over any reader/writer pair
//! - [`ProcessChannel`]: the text protocol to a spawned policy command
//! - [`InProcessChannel`]: direct calls into a [`SchedulingPolicy`]
//!
//! [`serve_policy`] is the other end of the text protocol: it lets an
//! in-process policy answer a referee over stdin/stdout.
//!
//! ## Wire format
//!
//! ```text
//! referee -> policy   invokerCount problemCount
//!                     timeLimit testCount          (once per problem)
//! per tick:
//! referee -> policy   problemId ... -1             (released submissions)
//!                     submission test OK|RJ ... -1 -1
//! policy -> referee   submission test ... -1 -1    (invocation requests)
//! ```

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use arbiter_core::{
    ArbiterError, ContestHeader, InvocationRequest, PolicyChannel, Problem, ProblemId,
    RequestFrame, Result, SchedulingPolicy, TestResult, TickUpdate, Verdict, Violation,
};
use tracing::{debug, info};

use crate::tokens::TokenReader;

/// Text protocol over a reader/writer pair
pub struct LineChannel<R, W> {
    tokens: TokenReader<R>,
    writer: W,
}

impl<R: BufRead, W: Write> LineChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        LineChannel {
            tokens: TokenReader::new(reader),
            writer,
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn next_request_value(&mut self) -> Result<Option<i64>> {
        match self.tokens.next_int()? {
            None => Ok(None),
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(token)) => Err(Violation::MalformedRequest { token }.into()),
        }
    }
}

impl<R: BufRead, W: Write> PolicyChannel for LineChannel<R, W> {
    fn announce_contest(&mut self, header: &ContestHeader) -> Result<()> {
        writeln!(self.writer, "{} {}", header.invoker_count, header.problems.len())?;
        for problem in &header.problems {
            writeln!(self.writer, "{} {}", problem.time_limit, problem.test_count)?;
        }
        Ok(())
    }

    fn announce_release(&mut self, problem: ProblemId) -> Result<()> {
        writeln!(self.writer, "{problem}")?;
        Ok(())
    }

    fn end_releases(&mut self) -> Result<()> {
        writeln!(self.writer, "-1")?;
        Ok(())
    }

    fn announce_result(&mut self, result: &TestResult) -> Result<()> {
        writeln!(
            self.writer,
            "{} {} {}",
            result.submission,
            result.test,
            result.token()
        )?;
        Ok(())
    }

    fn end_results(&mut self) -> Result<()> {
        writeln!(self.writer, "-1 -1")?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_request(&mut self) -> Result<RequestFrame> {
        let Some(submission) = self.next_request_value()? else {
            return Ok(RequestFrame::Eof);
        };
        let Some(test) = self.next_request_value()? else {
            return Ok(RequestFrame::Eof);
        };
        if submission == -1 && test == -1 {
            return Ok(RequestFrame::End);
        }
        Ok(RequestFrame::Invoke { submission, test })
    }
}

/// Direct connection to an in-process policy
///
/// Outbound messages of a tick are collected into a [`TickUpdate`]; the
/// first `read_request` of the tick hands it to the policy and replays
/// its answer, followed by the sentinel.
pub struct InProcessChannel<P> {
    policy: P,
    update: TickUpdate,
    replies: VecDeque<InvocationRequest>,
    polled: bool,
}

impl<P: SchedulingPolicy> InProcessChannel<P> {
    pub fn new(policy: P) -> Self {
        InProcessChannel {
            policy,
            update: TickUpdate::default(),
            replies: VecDeque::new(),
            polled: false,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn into_policy(self) -> P {
        self.policy
    }
}

impl<P: SchedulingPolicy> PolicyChannel for InProcessChannel<P> {
    fn announce_contest(&mut self, header: &ContestHeader) -> Result<()> {
        self.policy.start(header);
        Ok(())
    }

    fn announce_release(&mut self, problem: ProblemId) -> Result<()> {
        self.update.released.push(problem);
        Ok(())
    }

    fn end_releases(&mut self) -> Result<()> {
        Ok(())
    }

    fn announce_result(&mut self, result: &TestResult) -> Result<()> {
        self.update.results.push(*result);
        Ok(())
    }

    fn end_results(&mut self) -> Result<()> {
        self.polled = false;
        Ok(())
    }

    fn read_request(&mut self) -> Result<RequestFrame> {
        if !self.polled {
            self.polled = true;
            self.replies = self.policy.on_tick(&self.update).into();
            self.update.clear();
        }
        Ok(self
            .replies
            .pop_front()
            .map(RequestFrame::from)
            .unwrap_or(RequestFrame::End))
    }
}

/// Text protocol to a spawned policy process
///
/// The child's stderr is inherited. Dropping the channel closes the
/// child's stdin and reaps it, killing it if it is still running.
pub struct ProcessChannel {
    child: Child,
    channel: Option<LineChannel<BufReader<ChildStdout>, BufWriter<ChildStdin>>>,
}

impl ProcessChannel {
    /// Spawn `command`, split on whitespace into program and arguments
    pub fn spawn(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ArbiterError::config("empty policy command"))?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        info!(command, pid = child.id(), "spawned policy process");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ArbiterError::protocol("policy stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ArbiterError::protocol("policy stdout unavailable"))?;

        Ok(ProcessChannel {
            child,
            channel: Some(LineChannel::new(
                BufReader::new(stdout),
                BufWriter::new(stdin),
            )),
        })
    }

    /// Close the policy's input and wait for it to exit
    pub fn finish(mut self) -> Result<ExitStatus> {
        self.channel.take();
        Ok(self.child.wait()?)
    }

    fn line(&mut self) -> Result<&mut LineChannel<BufReader<ChildStdout>, BufWriter<ChildStdin>>> {
        self.channel
            .as_mut()
            .ok_or_else(|| ArbiterError::protocol("policy process already finished"))
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.channel.take();
        if let Ok(None) = self.child.try_wait() {
            debug!(pid = self.child.id(), "killing policy process");
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

impl PolicyChannel for ProcessChannel {
    fn announce_contest(&mut self, header: &ContestHeader) -> Result<()> {
        self.line()?.announce_contest(header)
    }

    fn announce_release(&mut self, problem: ProblemId) -> Result<()> {
        self.line()?.announce_release(problem)
    }

    fn end_releases(&mut self) -> Result<()> {
        self.line()?.end_releases()
    }

    fn announce_result(&mut self, result: &TestResult) -> Result<()> {
        self.line()?.announce_result(result)
    }

    fn end_results(&mut self) -> Result<()> {
        self.line()?.end_results()
    }

    fn read_request(&mut self) -> Result<RequestFrame> {
        self.line()?.read_request()
    }
}

/// Answer a referee with an in-process policy
///
/// Reads the contest header, then per tick the released problem ids and
/// the test results, and writes the policy's requests followed by the
/// sentinel. Returns cleanly when the referee closes the stream between
/// ticks.
pub fn serve_policy<R, W, P>(reader: R, mut writer: W, policy: &mut P) -> Result<()>
where
    R: BufRead,
    W: Write,
    P: SchedulingPolicy + ?Sized,
{
    let mut tokens = TokenReader::new(reader);
    if tokens.at_end()? {
        return Ok(());
    }

    let invoker_count = read_int(&mut tokens, "invoker count")?;
    let problem_count = read_int(&mut tokens, "problem count")?;
    let problems = (0..problem_count)
        .map(|_| {
            let time_limit = read_int(&mut tokens, "time limit")?;
            let test_count = read_int(&mut tokens, "test count")?;
            Ok(Problem::new(time_limit, test_count))
        })
        .collect::<Result<Vec<_>>>()?;
    policy.start(&ContestHeader {
        invoker_count: invoker_count.max(0) as usize,
        problems,
    });
    info!(policy = policy.name(), invoker_count, problem_count, "policy started");

    let mut update = TickUpdate::default();
    while !tokens.at_end()? {
        update.clear();
        loop {
            let problem = read_int(&mut tokens, "problem id")?;
            if problem == -1 {
                break;
            }
            update.released.push(to_index(problem, "problem id")?);
        }
        loop {
            let submission = read_int(&mut tokens, "submission id")?;
            let test = read_int(&mut tokens, "test id")?;
            if submission == -1 && test == -1 {
                break;
            }
            let token = tokens
                .next_token()?
                .ok_or_else(|| ArbiterError::protocol("stream ended inside a result"))?;
            update.results.push(TestResult {
                submission: to_index(submission, "submission id")?,
                test: to_index(test, "test id")?,
                passed: Verdict::from_token(0, &token).passed,
            });
        }

        for request in policy.on_tick(&update) {
            debug!(submission = request.submission, test = request.test, "requesting");
            writeln!(writer, "{} {}", request.submission, request.test)?;
        }
        writeln!(writer, "-1 -1")?;
        writer.flush()?;
    }
    Ok(())
}

fn read_int<R: BufRead>(tokens: &mut TokenReader<R>, what: &str) -> Result<i64> {
    match tokens.next_int()? {
        Some(Ok(value)) => Ok(value),
        Some(Err(token)) => Err(ArbiterError::protocol(format!(
            "expected {what}, found {token:?}"
        ))),
        None => Err(ArbiterError::protocol(format!(
            "stream ended while reading {what}"
        ))),
    }
}

fn to_index(value: i64, what: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| ArbiterError::protocol(format!("negative {what} {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers every tick with a fixed list of requests
    struct EchoPolicy {
        header: Option<ContestHeader>,
        seen: Vec<TickUpdate>,
        answer: Vec<InvocationRequest>,
    }

    impl EchoPolicy {
        fn new(answer: Vec<InvocationRequest>) -> Self {
            EchoPolicy {
                header: None,
                seen: Vec::new(),
                answer,
            }
        }
    }

    impl SchedulingPolicy for EchoPolicy {
        fn start(&mut self, header: &ContestHeader) {
            self.header = Some(header.clone());
        }

        fn on_tick(&mut self, update: &TickUpdate) -> Vec<InvocationRequest> {
            self.seen.push(update.clone());
            self.answer.clone()
        }

        fn name(&self) -> &str {
            "Echo"
        }
    }

    fn header() -> ContestHeader {
        ContestHeader {
            invoker_count: 2,
            problems: vec![Problem::new(1000, 3), Problem::new(250, 1)],
        }
    }

    #[test]
    fn test_line_channel_writes_tick_frames() {
        let mut channel = LineChannel::new("".as_bytes(), Vec::new());
        channel.announce_contest(&header()).unwrap();
        channel.announce_release(1).unwrap();
        channel.end_releases().unwrap();
        channel
            .announce_result(&TestResult { submission: 0, test: 2, passed: false })
            .unwrap();
        channel
            .announce_result(&TestResult { submission: 1, test: 0, passed: true })
            .unwrap();
        channel.end_results().unwrap();

        let text = String::from_utf8(channel.into_writer()).unwrap();
        assert_eq!(text, "2 2\n1000 3\n250 1\n1\n-1\n0 2 RJ\n1 0 OK\n-1 -1\n");
    }

    #[test]
    fn test_line_channel_reads_requests() {
        let input = "0 1\n2 0 -1 -1\n-1 5\n";
        let mut channel = LineChannel::new(input.as_bytes(), Vec::new());
        assert_eq!(
            channel.read_request().unwrap(),
            RequestFrame::Invoke { submission: 0, test: 1 }
        );
        assert_eq!(
            channel.read_request().unwrap(),
            RequestFrame::Invoke { submission: 2, test: 0 }
        );
        assert_eq!(channel.read_request().unwrap(), RequestFrame::End);
        // only the exact pair is the sentinel
        assert_eq!(
            channel.read_request().unwrap(),
            RequestFrame::Invoke { submission: -1, test: 5 }
        );
        assert_eq!(channel.read_request().unwrap(), RequestFrame::Eof);
    }

    #[test]
    fn test_line_channel_half_pair_is_eof() {
        let mut channel = LineChannel::new("3".as_bytes(), Vec::new());
        assert_eq!(channel.read_request().unwrap(), RequestFrame::Eof);
    }

    #[test]
    fn test_line_channel_rejects_garbage() {
        let mut channel = LineChannel::new("0 x\n".as_bytes(), Vec::new());
        let err = channel.read_request().unwrap_err();
        assert_eq!(
            err.violation(),
            Some(&Violation::MalformedRequest { token: "x".to_string() })
        );
    }

    #[test]
    fn test_in_process_channel_batches_a_tick() {
        let policy = EchoPolicy::new(vec![InvocationRequest::new(0, 0), InvocationRequest::new(0, 1)]);
        let mut channel = InProcessChannel::new(policy);
        channel.announce_contest(&header()).unwrap();
        channel.announce_release(0).unwrap();
        channel.end_releases().unwrap();
        channel.end_results().unwrap();

        assert_eq!(
            channel.read_request().unwrap(),
            RequestFrame::Invoke { submission: 0, test: 0 }
        );
        assert_eq!(
            channel.read_request().unwrap(),
            RequestFrame::Invoke { submission: 0, test: 1 }
        );
        assert_eq!(channel.read_request().unwrap(), RequestFrame::End);

        let policy = channel.into_policy();
        assert_eq!(policy.header, Some(header()));
        assert_eq!(policy.seen.len(), 1);
        assert_eq!(policy.seen[0].released, vec![0]);
    }

    #[test]
    fn test_in_process_channel_polls_once_per_tick() {
        let mut channel = InProcessChannel::new(EchoPolicy::new(Vec::new()));
        for _ in 0..3 {
            channel.end_releases().unwrap();
            channel.end_results().unwrap();
            assert_eq!(channel.read_request().unwrap(), RequestFrame::End);
        }
        assert_eq!(channel.policy().seen.len(), 3);
    }

    #[test]
    fn test_serve_policy_answers_each_tick() {
        let input = "2 1\n1000 3\n0\n-1\n-1 -1\n-1\n0 0 OK\n0 1 RJ\n-1 -1\n";
        let mut policy = EchoPolicy::new(vec![InvocationRequest::new(0, 2)]);
        let mut output = Vec::new();
        serve_policy(input.as_bytes(), &mut output, &mut policy).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), "0 2\n-1 -1\n0 2\n-1 -1\n");
        assert_eq!(policy.header.as_ref().unwrap().invoker_count, 2);
        assert_eq!(policy.seen.len(), 2);
        assert_eq!(policy.seen[0].released, vec![0]);
        assert_eq!(
            policy.seen[1].results,
            vec![
                TestResult { submission: 0, test: 0, passed: true },
                TestResult { submission: 0, test: 1, passed: false },
            ]
        );
    }

    #[test]
    fn test_serve_policy_on_empty_input() {
        let mut policy = EchoPolicy::new(Vec::new());
        let mut output = Vec::new();
        serve_policy("".as_bytes(), &mut output, &mut policy).unwrap();
        assert!(output.is_empty());
        assert!(policy.header.is_none());
    }

    #[test]
    fn test_serve_policy_rejects_truncated_tick() {
        let mut policy = EchoPolicy::new(Vec::new());
        let err = serve_policy("1 0\n-1\n0".as_bytes(), Vec::new(), &mut policy).unwrap_err();
        assert!(matches!(err, ArbiterError::Protocol(_)));
    }
}
