//! A parser for the subset of XML that tree documents use: elements,
//! attributes, comments and processing instructions. Text content, CDATA
//! sections and the document type declaration are skipped.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_till1, take_until, take_while},
    character::complete::{char, multispace0, multispace1, satisfy},
    combinator::{cut, map, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute<'src> {
    pub name: &'src str,
    /// The value with entity references decoded.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement<'src> {
    pub name: &'src str,
    pub attributes: Vec<XmlAttribute<'src>>,
    pub children: Vec<XmlElement<'src>>,
}

impl<'src> XmlElement<'src> {
    pub fn new(name: &'src str) -> Self {
        Self {
            name,
            attributes: vec![],
            children: vec![],
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Replaces the value of an existing attribute or appends a new one.
    pub fn set_attribute(&mut self, name: &'src str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|attr| attr.name == name) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(XmlAttribute { name, value }),
        }
    }

    /// Child elements with the given tag name.
    pub fn elements<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement<'src>> {
        self.children.iter().filter(move |child| child.name == name)
    }
}

/// A parsed tree document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSource<'src> {
    pub root: XmlElement<'src>,
}

fn xml_name(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_' || c == ':'),
        take_while(|c: char| c.is_ascii_alphanumeric() || "_:.-".contains(c)),
    ))(i)
}

fn comment(i: &str) -> IResult<&str, ()> {
    value((), tuple((tag("<!--"), take_until("-->"), tag("-->"))))(i)
}

fn processing_instruction(i: &str) -> IResult<&str, ()> {
    value((), tuple((tag("<?"), take_until("?>"), tag("?>"))))(i)
}

fn doctype(i: &str) -> IResult<&str, ()> {
    value((), tuple((tag("<!DOCTYPE"), take_till(|c| c == '>'), char('>'))))(i)
}

fn cdata(i: &str) -> IResult<&str, ()> {
    value((), tuple((tag("<![CDATA["), take_until("]]>"), tag("]]>"))))(i)
}

fn text(i: &str) -> IResult<&str, ()> {
    value((), take_till1(|c| c == '<'))(i)
}

/// Whitespace, comments and declarations allowed around the root element.
fn misc(i: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            comment,
            processing_instruction,
            doctype,
        ))),
    )(i)
}

fn attribute_value(i: &str) -> IResult<&str, String> {
    let (i, raw) = alt((
        delimited(char('"'), take_till(|c| c == '"'), char('"')),
        delimited(char('\''), take_till(|c| c == '\''), char('\'')),
    ))(i)?;
    Ok((i, decode_entities(raw)))
}

fn attribute(i: &str) -> IResult<&str, XmlAttribute> {
    let (i, (_, name, _, _, _, value)) = tuple((
        multispace1,
        xml_name,
        multispace0,
        char('='),
        multispace0,
        cut(attribute_value),
    ))(i)?;
    Ok((i, XmlAttribute { name, value }))
}

fn content(i: &str) -> IResult<&str, Vec<XmlElement>> {
    let (i, nodes) = many0(alt((
        map(element, Some),
        value(None, comment),
        value(None, cdata),
        value(None, processing_instruction),
        value(None, text),
    )))(i)?;
    Ok((i, nodes.into_iter().flatten().collect()))
}

fn closing_tag<'src>(name: &'src str) -> impl FnMut(&'src str) -> IResult<&'src str, ()> {
    move |i| {
        let (rest, close) = preceded(tag("</"), xml_name)(i)?;
        if close != name {
            return Err(nom::Err::Failure(nom::error::Error::new(
                i,
                nom::error::ErrorKind::Tag,
            )));
        }
        value((), preceded(multispace0, char('>')))(rest)
    }
}

fn element(i: &str) -> IResult<&str, XmlElement> {
    let (i, name) = preceded(char('<'), xml_name)(i)?;

    // Past the tag name this can only be an element; errors are final.
    let (i, attributes) = many0(attribute)(i)?;
    let (i, _) = multispace0(i)?;
    if let Ok((i, _)) = tag::<_, _, nom::error::Error<&str>>("/>")(i) {
        return Ok((
            i,
            XmlElement {
                name,
                attributes,
                children: vec![],
            },
        ));
    }
    let (i, _) = cut(char('>'))(i)?;
    let (i, children) = content(i)?;
    let (i, _) = cut(closing_tag(name))(i)?;

    Ok((
        i,
        XmlElement {
            name,
            attributes,
            children,
        },
    ))
}

/// Parses a whole document. The caller checks that nothing is left over.
pub fn parse_file(i: &str) -> IResult<&str, TreeSource> {
    let (i, _) = opt(char('\u{feff}'))(i)?;
    let (i, _) = misc(i)?;
    let (i, root) = element(i)?;
    let (i, _) = misc(i)?;
    Ok((i, TreeSource { root }))
}

fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let decoded = rest
            .find(';')
            .and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            // Not a reference we know, keep it literally
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
