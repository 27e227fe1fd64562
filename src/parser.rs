use super::{
    Kind,
    Label,
    Labels,
    Sample,
};
use winnow::{
    ascii::{
        digit1,
        escaped,
        newline,
        space0,
        Caseless,
    },
    combinator::{
        alt,
        cut_err,
        delimited,
        eof,
        opt,
        preceded,
        repeat,
        separated,
        terminated,
    },
    error::ParseError,
    stream::{
        Accumulate,
        AsBStr,
        AsChar,
    },
    token::{
        none_of,
        one_of,
        tag,
        take_till,
        take_while,
    },
    PResult,
    Parser,
};

/// Parse a valid prometheus `metric_name` or `label_name`.
fn name_parser(input: &mut &str) -> PResult<String> {
    let start_group = ('a'..='z', 'A'..='Z', '_', ':');
    let rest_group = ('a'..='z', 'A'..='Z', '0'..='9', '_', ':');
    (one_of(start_group), take_while(0.., rest_group))
        .map(|(ch, rest)| format!("{ch}{rest}"))
        .parse_next(input)
}

/// Parse a valid prometheus label value.
///
/// Examples:
///
/// * `"Test"`
/// * `"Some value"`
fn label_value_parser(input: &mut &str) -> PResult<String> {
    let escaped = escaped(none_of(br#""\"#), '\\', one_of(br#""n\"#));
    preceded('\"', cut_err(terminated(escaped, '\"')))
        .parse_to()
        .parse_next(input)
}

/// Parse a Prometheus label key value pair.
///
/// Examples:
///
/// * `key1="value1"`
/// * `key = "value"`
/// * `key= "val"`
fn label_key_value_parser(input: &mut &str) -> PResult<(String, String)> {
    let key = name_parser.parse_next(input)?;
    let _ = (space0, '=', space0).parse_next(input)?;
    let val = label_value_parser.parse_next(input)?;
    Ok((key, val))
}

// Enable us to parse the collection of key value pairs into the `Labels` structure
impl Accumulate<(String, String)> for Labels {
    fn initial(capacity: Option<usize>) -> Self {
        Vec::with_capacity(capacity.unwrap_or(4)).into()
    }

    fn accumulate(&mut self, acc: (String, String)) {
        self.push(Label::new(acc.0, acc.1));
    }
}

/// Parses a list of labels delimited by braces
///
/// Examples:
/// * `{key1="value1",key2="value2"}`
/// * `{key1="value1", key2 = "value2"}`
/// * `{ key1="value1", key2 = "value2" }`
fn labels_parser(input: &mut &str) -> PResult<Labels> {
    let separator = (space0, ',', space0);
    let list = separated(1.., label_key_value_parser, separator);
    let start_delimiter = ("{", space0);
    let end_delimiter = (space0, "}");
    let mut labels = delimited(start_delimiter, list, end_delimiter);
    labels.parse_next(input)
}

/// Parse a valid Prometheus sample value (+Inf, -Inf, NaN, ...) into an
/// `f64`.
fn float_value_parser(input: &mut &str) -> PResult<f64> {
    let number = (
        opt(one_of(['+', '-'])),
        alt((
            (digit1, opt(('.', opt(digit1)))).map(|_| ()),
            ('.', digit1).map(|_| ()),
        )),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), cut_err(digit1))),
    )
        .recognize();
    let nan = tag(Caseless("nan"));
    let inf = alt((tag(Caseless("inf")), tag(Caseless("+inf"))));
    let neg_inf = tag(Caseless("-inf"));
    alt((number, nan, inf, neg_inf))
        .parse_to()
        .parse_next(input)
}

/// Parse a valid Prometheus int value
fn int_value_parser(input: &mut &str) -> PResult<i64> {
    let prefix = opt(one_of(['+', '-']));
    (prefix, digit1).recognize().parse_to().parse_next(input)
}

/// Validate that the next character is either a new line or an EoF, returning an error if not
fn new_line_or_eof_parser(input: &mut &str) -> PResult<()> {
    alt((eof.map(|_| ()), newline.map(|_| ()))).parse_next(input)
}

/// Parse the rest of line until either EoF or NewLine (Parsing & ignoring the newline character)
fn rest_of_the_line_parser<'a>(input: &mut &'a str) -> PResult<&'a str> {
    let rest = preceded(space0, take_till(1.., AsChar::is_newline)).parse_next(input)?;
    new_line_or_eof_parser.parse_next(input)?;
    Ok(rest)
}

/// Parse a Prometheus comment line, discarding it.
///
/// A comment is anything that starts with #.
///
/// Example:
/// * `# This is a comment`
fn comment_line_parser(input: &mut &str) -> PResult<Option<Sample>> {
    preceded((space0, tag("#"), space0), rest_of_the_line_parser)
        .map(|_| None)
        .parse_next(input)
}

/// Parse a Prometheus HELP line, discarding it.
///
/// A HELP line is a comment that starts with #, followed by "HELP", followed by the name of
/// the metric, followed by its description.
///
/// Example:
/// * `# HELP http_request_duration_seconds A histogram of the request duration.`
fn help_line_parser(input: &mut &str) -> PResult<Option<Sample>> {
    let ignored = (space0, tag("#"), space0, tag("HELP"), space0);
    let _name = preceded(ignored, name_parser).parse_next(input)?;
    let _desc = rest_of_the_line_parser.parse_next(input)?;
    Ok(None)
}

/// Parse a Prometheus TYPE line, discarding it.
///
/// A TYPE line is a comment that starts with #, followed by "TYPE", followed by the name of
/// the metric, followed by its kind - one of (counter, gauge, untyped, summary, histogram).
/// A TYPE line naming any other kind does not match and is consumed as a
/// plain comment instead.
///
/// Example:
/// * `# TYPE http_request_duration_seconds histogram`
fn type_line_parser(input: &mut &str) -> PResult<Option<Sample>> {
    let ignored = (space0, tag("#"), space0, tag("TYPE"), space0);
    let _name = preceded(ignored, name_parser).parse_next(input)?;
    let _kind: Kind = rest_of_the_line_parser.parse_to().parse_next(input)?;
    Ok(None)
}

/// Parse a Prometheus sample line.
///
/// Examples:
/// * `data_sent:bytes{th_id="worker_0",type="duplex"} 1395`
/// * `metric_without_timestamp_and_labels 12.47`
/// * `metric_without_timestamp_and_labels 12.47 -1`
/// * `http_request_duration_seconds_count 144320`
fn sample_line_parser(input: &mut &str) -> PResult<Option<Sample>> {
    let name = name_parser.parse_next(input)?;
    // Parse the labels, if they exist, otherwise return an empty Vec.
    let labels = preceded(space0, opt(labels_parser))
        .parse_next(input)?
        .unwrap_or_default();
    let value = preceded(space0, float_value_parser).parse_next(input)?;
    let timestamp = preceded(space0, opt(int_value_parser)).parse_next(input)?;
    // Expect the line to end after
    (space0, new_line_or_eof_parser).parse_next(input)?;
    Ok(Some(Sample::new(name, labels, value, timestamp)))
}

/// Parse an empty line. For completeness.
fn empty_line_parser(input: &mut &str) -> PResult<Option<Sample>> {
    (space0, newline).map(|_| None).parse_next(input)
}

/// Parse a single line of the scrape.
///
/// Only sample lines produce a value; everything the format allows around
/// them is consumed and skipped.
fn scrape_line_parser(input: &mut &str) -> PResult<Option<Sample>> {
    alt((
        help_line_parser,
        type_line_parser,
        comment_line_parser,
        sample_line_parser,
        empty_line_parser,
    ))
    .parse_next(input)
}

/// Parse a complete scrape into its sample lines.
fn scrape_lines_parser(input: &mut &str) -> PResult<Vec<Option<Sample>>> {
    repeat(0.., scrape_line_parser).parse_next(input)
}

/// Failure to parse a scrape as exposition text.
#[derive(Debug, Clone, derive_more::Display)]
#[display(fmt = "invalid exposition text: {}", _0)]
pub struct ScrapeParseError(String);

impl std::error::Error for ScrapeParseError {}

impl<I, E> From<ParseError<I, E>> for ScrapeParseError
where
    I: AsBStr,
    E: std::fmt::Display,
{
    fn from(value: ParseError<I, E>) -> Self {
        Self(value.to_string())
    }
}

/// Parse the text of a scrape into the flat list of its samples, in text
/// order. Families are not reassembled; `# HELP`/`# TYPE` comments and
/// empty lines are tolerated and skipped. Any line that fits none of the
/// format's line kinds fails the whole parse.
pub fn parse_samples(input: &str) -> Result<Vec<Sample>, ScrapeParseError> {
    let lines = scrape_lines_parser.parse(input).map_err(ScrapeParseError::from)?;
    Ok(lines.into_iter().flatten().collect())
}
