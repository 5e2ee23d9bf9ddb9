//! Scans raw scenario bytes into [`BytecodeElement`]s.
//!
//! Grounded on `original_source/src/libreallive/parser.cc`'s
//! `Parser::ParseBytecode`/`ParseTextout`/`ParseFunction` and the
//! per-element constructors in `elements/{meta,textout,command}.cc`.

use rlvm_types::{EntryPoint, Error, OpcodeTriple, Result};

use crate::expr::{self, Cursor, Expression};

use super::element::{BytecodeElement, MetaKind, SelectOption};

fn peek(data: &[u8], pos: usize) -> u8 {
    data.get(pos).copied().unwrap_or(0)
}

fn read_i16_at(data: &[u8], pos: usize) -> i16 {
    let lo = peek(data, pos) as i16;
    let hi = peek(data, pos + 1) as i16;
    lo | (hi << 8)
}

fn read_i32_at(data: &[u8], pos: usize) -> i32 {
    let mut buf = [0u8; 4];
    for i in 0..4 {
        buf[i] = peek(data, pos + i);
    }
    i32::from_le_bytes(buf)
}

/// Parse one bytecode element starting at `pos`. `kidoku_table`, if
/// present, lets a `Meta` element tell a plain kidoku counter apart from
/// a disguised entry point. `entrypoint_marker` is the textout scan's
/// stop character (see [`parse_textout`]): it starts at `@` and
/// latches to `!` forever once a `!`-introduced meta element is seen,
/// mirroring `parser.cc`'s process-wide `entrypoint_marker` global.
///
/// Returns the parsed element and the number of bytes it consumed.
pub fn parse_element(
    data: &[u8],
    pos: usize,
    kidoku_table: Option<&[u32]>,
    entrypoint_marker: &mut u8,
) -> Result<(BytecodeElement, usize)> {
    let c = peek(data, pos);
    if c == b'!' {
        *entrypoint_marker = b'!';
    }

    match c {
        0 | b',' => Ok((BytecodeElement::Comma, 1)),
        b'\n' => parse_meta(data, pos, None),
        b'@' | b'!' => parse_meta(data, pos, kidoku_table),
        b'$' => parse_expression_element(data, pos),
        b'#' => parse_function(data, pos),
        _ => parse_textout(data, pos, *entrypoint_marker),
    }
}

fn parse_meta(
    data: &[u8],
    pos: usize,
    kidoku_table: Option<&[u32]>,
) -> Result<(BytecodeElement, usize)> {
    let value = read_i16_at(data, pos + 1);
    let kind = match kidoku_table {
        None => MetaKind::Line,
        Some(table) => {
            let raw = table.get(value as usize).copied().ok_or_else(|| {
                Error::OutOfRange(format!("kidoku table has no entry {value}"))
            })?;
            match EntryPoint::from_raw(raw as i32) {
                Some(ep) => MetaKind::Entrypoint(ep.0),
                None => MetaKind::Kidoku,
            }
        }
    };
    Ok((BytecodeElement::Meta { kind, value }, 3))
}

/// The scan performed by `Parser::ParseTextout`: runs until a control
/// character outside of quotes, honouring Shift-JIS lead bytes so a
/// trail byte that happens to equal a delimiter isn't mistaken for one.
fn parse_textout(data: &[u8], pos: usize, entrypoint_marker: u8) -> Result<(BytecodeElement, usize)> {
    let mut end = pos;
    let mut quoted = false;

    while end < data.len() {
        if quoted {
            quoted = peek(data, end) != b'"';
            if peek(data, end) == b'\\' && peek(data, end + 1) == b'"' {
                end += 1;
            }
        } else {
            if peek(data, end) == b',' {
                end += 1;
            }
            quoted = peek(data, end) == b'"';

            let c = peek(data, end);
            if end >= data.len()
                || c == 0
                || c == b'#'
                || c == b'$'
                || c == b'\n'
                || c == b'@'
                || c == entrypoint_marker
            {
                break;
            }
        }

        let c = peek(data, end);
        if (0x81..=0x9f).contains(&c) || (0xe0..=0xef).contains(&c) {
            end += 2;
        } else {
            end += 1;
        }
    }

    let raw = data[pos..end.min(data.len())].to_vec();
    let len = end - pos;
    Ok((BytecodeElement::Textout { raw }, len.max(1)))
}

/// Unquote and unescape a textout span's raw bytes, matching
/// `TextoutElement::GetText`.
pub fn unescape_textout(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut quoted = false;
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b == b'"' {
            i += 1;
            quoted = !quoted;
        } else if quoted && b == b'\\' {
            i += 1;
            if i < raw.len() && raw[i] == b'"' {
                out.push(b'"');
                i += 1;
            } else {
                out.push(b'\\');
            }
        } else {
            if (0x81..=0x9f).contains(&b) || (0xe0..=0xef).contains(&b) {
                out.push(b);
                i += 1;
            }
            if i < raw.len() {
                out.push(raw[i]);
                i += 1;
            }
        }
    }
    out
}

fn parse_expression_element(data: &[u8], pos: usize) -> Result<(BytecodeElement, usize)> {
    let mut cur = Cursor::at(data, pos);
    let expr = expr::get_assignment(&mut cur)?;
    let len = cur.position() - pos;
    Ok((BytecodeElement::Expression(expr), len))
}

/// The packed `(type<<24|module<<16|opcode)` control-flow dispatch table
/// from `Parser::ParseFunction`; see SPEC_FULL.md's captured copy.
fn control_flow_kind(packed: u32) -> Option<&'static str> {
    const GOTO: &[u32] = &[
        0x0001_0000,
        0x0001_0005,
        0x0005_0001,
        0x0005_0005,
        0x0006_0001,
        0x0006_0005,
    ];
    const GOTO_IF: &[u32] = &[
        0x0001_0001,
        0x0001_0002,
        0x0001_0006,
        0x0001_0007,
        0x0005_0002,
        0x0005_0006,
        0x0005_0007,
        0x0006_0000,
        0x0006_0002,
        0x0006_0006,
        0x0006_0007,
    ];
    const GOTO_ON: &[u32] = &[
        0x0001_0003,
        0x0001_0008,
        0x0005_0003,
        0x0005_0008,
        0x0006_0003,
        0x0006_0008,
    ];
    const GOTO_CASE: &[u32] = &[
        0x0001_0004,
        0x0001_0009,
        0x0005_0004,
        0x0005_0009,
        0x0006_0004,
        0x0006_0009,
    ];
    const GOSUB_WITH: &[u32] = &[0x0001_0010, 0x0006_0010];
    const SELECT: &[u32] = &[0x0002_0000, 0x0002_0001, 0x0002_0002, 0x0002_0003, 0x0002_0010];

    if GOTO.contains(&packed) {
        Some("goto")
    } else if GOTO_IF.contains(&packed) {
        Some("goto_if")
    } else if GOTO_ON.contains(&packed) {
        Some("goto_on")
    } else if GOTO_CASE.contains(&packed) {
        Some("goto_case")
    } else if GOSUB_WITH.contains(&packed) {
        Some("gosub_with")
    } else if SELECT.contains(&packed) {
        Some("select")
    } else {
        None
    }
}

fn read_command_header(data: &[u8], pos: usize) -> (OpcodeTriple, u8, u16) {
    let type_ = peek(data, pos + 1);
    let module = peek(data, pos + 2);
    let opcode = peek(data, pos + 3) as u16 | ((peek(data, pos + 4) as u16) << 8);
    let argc = peek(data, pos + 5) as u16 | ((peek(data, pos + 6) as u16) << 8);
    let overload = peek(data, pos + 7);
    (OpcodeTriple { type_, module, opcode }, overload, argc)
}

fn packed_key(triple: &OpcodeTriple) -> u32 {
    ((triple.type_ as u32) << 24) | ((triple.module as u32) << 16) | (triple.opcode as u32)
}

fn parse_function(data: &[u8], pos: usize) -> Result<(BytecodeElement, usize)> {
    let (triple, _overload, _argc) = read_command_header(data, pos);
    match control_flow_kind(packed_key(&triple)) {
        Some("goto") => parse_goto(data, pos),
        Some("goto_if") => parse_goto_if(data, pos),
        Some("goto_on") => parse_goto_on(data, pos),
        Some("goto_case") => parse_goto_case(data, pos),
        Some("gosub_with") => parse_gosub_with(data, pos),
        Some("select") => parse_select(data, pos),
        _ => parse_generic_function(data, pos, triple),
    }
}

fn parse_goto(data: &[u8], pos: usize) -> Result<(BytecodeElement, usize)> {
    let target_id = read_i32_at(data, pos + 8) as u32;
    Ok((BytecodeElement::Goto { target_id }, 12))
}

fn parse_goto_if(data: &[u8], pos: usize) -> Result<(BytecodeElement, usize)> {
    let mut end = pos + 8;
    let mut condition = None;
    if peek(data, end) == b'(' {
        end += 1;
        let elen = expr::next_expression_len(data, end);
        let mut cur = Cursor::at(data, end);
        condition = Some(expr::get_expression(&mut cur)?);
        end += elen;
        if peek(data, end) != b')' {
            return Err(Error::BadFormat("expected ')' in GotoIf".into()));
        }
        end += 1;
    }
    let target_id = read_i32_at(data, end) as u32;
    end += 4;
    Ok((
        BytecodeElement::GotoIf { condition, target_id },
        end - pos,
    ))
}

fn parse_goto_on(data: &[u8], pos: usize) -> Result<(BytecodeElement, usize)> {
    let mut end = pos + 8;
    let elen = expr::next_expression_len(data, end);
    let mut cur = Cursor::at(data, end);
    let condition = expr::get_expression(&mut cur)?;
    end += elen;

    if peek(data, end) != b'{' {
        return Err(Error::BadFormat("expected '{' in GotoOn".into()));
    }
    end += 1;
    let (_, _, argc) = read_command_header(data, pos);
    let mut target_ids = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        target_ids.push(read_i32_at(data, end) as u32);
        end += 4;
    }
    if peek(data, end) != b'}' {
        return Err(Error::BadFormat("expected '}' in GotoOn".into()));
    }
    end += 1;
    Ok((
        BytecodeElement::GotoOn { condition, target_ids },
        end - pos,
    ))
}

fn parse_goto_case(data: &[u8], pos: usize) -> Result<(BytecodeElement, usize)> {
    let mut end = pos + 8;
    let elen = expr::next_expression_len(data, end);
    let mut cur = Cursor::at(data, end);
    let condition = expr::get_expression(&mut cur)?;
    end += elen;

    if peek(data, end) != b'{' {
        return Err(Error::BadFormat("expected '{' in GotoCase".into()));
    }
    end += 1;
    let (_, _, argc) = read_command_header(data, pos);
    let mut cases = Vec::with_capacity(argc as usize);
    let mut target_ids = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        if peek(data, end) != b'(' {
            return Err(Error::BadFormat("expected '(' in GotoCase case".into()));
        }
        if peek(data, end + 1) == b')' {
            cases.push(None);
            end += 2;
        } else {
            let clen = expr::next_expression_len(data, end + 1);
            let mut case_cur = Cursor::at(data, end + 1);
            cases.push(Some(expr::get_expression(&mut case_cur)?));
            end += clen + 1;
            if peek(data, end) != b')' {
                return Err(Error::BadFormat("expected ')' in GotoCase case".into()));
            }
            end += 1;
        }
        target_ids.push(read_i32_at(data, end) as u32);
        end += 4;
    }
    if peek(data, end) != b'}' {
        return Err(Error::BadFormat("expected '}' in GotoCase".into()));
    }
    end += 1;
    Ok((
        BytecodeElement::GotoCase {
            condition,
            cases,
            target_ids,
        },
        end - pos,
    ))
}

fn parse_gosub_with(data: &[u8], pos: usize) -> Result<(BytecodeElement, usize)> {
    let mut end = pos + 8;
    let mut params = Vec::new();
    if peek(data, end) == b'(' {
        end += 1;
        while peek(data, end) != b')' {
            let plen = expr::next_data_len(data, end);
            let mut cur = Cursor::at(data, end);
            params.push(expr::get_data(&mut cur)?);
            end += plen;
        }
        end += 1;
    }
    let target_id = read_i32_at(data, end) as u32;
    end += 4;
    Ok((BytecodeElement::GosubWith { params, target_id }, end - pos))
}

fn parse_select(data: &[u8], pos: usize) -> Result<(BytecodeElement, usize)> {
    let mut end = pos + 8;
    let mut window = Expression::IntConstant(-1);
    if peek(data, end) == b'(' {
        let elen = expr::next_expression_len(data, end);
        let mut cur = Cursor::at(data, end);
        window = expr::get_expression(&mut cur)?;
        end += elen;
    }

    if peek(data, end) != b'{' {
        return Err(Error::BadFormat("SelectElement: expected '{'".into()));
    }
    end += 1;

    if peek(data, end) == b'\n' {
        end += 3;
    }

    let (_, _, argc) = read_command_header(data, pos);
    let mut options = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        while peek(data, end) == b',' {
            end += 1;
        }
        let mut condition = Vec::new();
        if peek(data, end) == b'(' {
            let cond_start = end;
            end += 1;
            while peek(data, end) != b')' {
                // An optional guarding expression in parens...
                if peek(data, end) == b'(' {
                    let clen = expr::next_expression_len(data, end);
                    end += clen;
                }
                // ...then always a one-byte effect selector...
                let effect = peek(data, end);
                end += 1;
                // ...then, unless the effect is one of the two that take
                // no argument, an effect-argument expression.
                let seekarg = effect != b'2' && effect != b'3';
                let next = peek(data, end);
                if seekarg && next != b')' && !next.is_ascii_digit() {
                    let arglen = expr::next_expression_len(data, end);
                    end += arglen;
                }
            }
            end += 1;
            condition = data[cond_start..end].to_vec();
        }

        let tlen = expr::next_string_len(data, end);
        let text_raw = data[end..end + tlen].to_vec();
        end += tlen;
        if peek(data, end) != b'\n' {
            return Err(Error::BadFormat("SelectElement: expected line marker".into()));
        }
        let line = read_i16_at(data, end + 1);
        end += 3;

        let text = String::from_utf8_lossy(&unescape_textout(&text_raw)).into_owned();
        options.push(SelectOption { condition, text, line });
    }

    // CLANNAD carries extra bare `\n<i16>` entries past argc() in at
    // least one path (Kotomi's route); tolerate them rather than
    // erroring, matching the "HACK?" comment this is grounded on.
    while peek(data, end) == b'\n' {
        end += 3;
    }

    if peek(data, end) != b'}' {
        return Err(Error::BadFormat("SelectElement: expected '}'".into()));
    }
    end += 1;

    Ok((BytecodeElement::Select { window, options }, end - pos))
}

fn parse_generic_function(
    data: &[u8],
    pos: usize,
    triple: OpcodeTriple,
) -> Result<(BytecodeElement, usize)> {
    let overload = peek(data, pos + 7);
    let mut end = pos + 8;
    let mut params = Vec::new();
    if peek(data, end) == b'(' {
        end += 1;
        while peek(data, end) != b')' {
            let plen = expr::next_data_len(data, end);
            let mut cur = Cursor::at(data, end);
            params.push(expr::get_data(&mut cur)?);
            end += plen;
        }
        end += 1;
    }
    Ok((
        BytecodeElement::Command {
            triple,
            overload,
            params,
        },
        end - pos,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::element::MetaKind;

    #[test]
    fn comma_consumes_one_byte() {
        let (el, len) = parse_element(&[b','], 0, None, &mut b'@').unwrap();
        assert_eq!(el, BytecodeElement::Comma);
        assert_eq!(len, 1);
    }

    #[test]
    fn line_meta_without_kidoku_table() {
        let data = [b'\n', 5, 0];
        let (el, len) = parse_element(&data, 0, None, &mut b'@').unwrap();
        assert_eq!(
            el,
            BytecodeElement::Meta {
                kind: MetaKind::Line,
                value: 5
            }
        );
        assert_eq!(len, 3);
    }

    #[test]
    fn kidoku_meta_resolves_entrypoint_from_table() {
        let data = [b'@', 0, 0];
        let table = [rlvm_types::ENTRYPOINT_THRESHOLD as u32 + 3];
        let (el, _) = parse_element(&data, 0, Some(&table), &mut b'@').unwrap();
        assert_eq!(
            el,
            BytecodeElement::Meta {
                kind: MetaKind::Entrypoint(3),
                value: 0
            }
        );
    }

    #[test]
    fn bang_entrypoint_marker_latches() {
        let mut marker = b'@';
        let data = [b'!', 0, 0];
        let table = [0u32];
        let _ = parse_element(&data, 0, Some(&table), &mut marker).unwrap();
        assert_eq!(marker, b'!');
    }

    #[test]
    fn textout_stops_at_control_character() {
        let data = b"hello#world";
        let (el, len) = parse_element(data, 0, None, &mut b'@').unwrap();
        match el {
            BytecodeElement::Textout { raw } => assert_eq!(raw, b"hello"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(len, 5);
    }

    #[test]
    fn textout_unescapes_quoted_text() {
        let raw = b"\"she said \\\"hi\\\"\"";
        let text = unescape_textout(raw);
        assert_eq!(String::from_utf8(text).unwrap(), "she said \"hi\"");
    }

    #[test]
    fn expression_element_parses_assignment() {
        let mut bytes = vec![0x00u8, b'[', b'$', 0xff, 0, 0, 0, 0, b']', b'\\', 0x1e];
        bytes.extend([b'$', 0xff, 9, 0, 0, 0]);
        let (el, len) = parse_element(&bytes, 0, None, &mut b'@').unwrap();
        assert_eq!(len, bytes.len());
        assert!(matches!(el, BytecodeElement::Expression(Expression::Binary { op: 0x1e, .. })));
    }

    #[test]
    fn void_command_has_no_params() {
        // type=1 module=3 opcode=0x0101 argc=0 overload=0
        let data = [b'#', 1, 3, 0x01, 0x01, 0, 0, 0];
        let (el, len) = parse_element(&data, 0, None, &mut b'@').unwrap();
        assert_eq!(len, 8);
        match el {
            BytecodeElement::Command { triple, params, .. } => {
                assert_eq!(triple.opcode, 0x0101);
                assert!(params.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn goto_reads_12_byte_form() {
        // type=1 module=1 opcode=0x0000 -> packed 0x00010000 => Goto
        let mut data = vec![b'#', 1, 1, 0x00, 0x00, 0, 0, 0];
        data.extend(100i32.to_le_bytes());
        let (el, len) = parse_element(&data, 0, None, &mut b'@').unwrap();
        assert_eq!(len, 12);
        assert_eq!(el, BytecodeElement::Goto { target_id: 100 });
    }

    #[test]
    fn goto_if_reads_optional_condition() {
        // type=1 module=1 opcode=0x0001 -> packed 0x00010001 => GotoIf
        let mut data = vec![b'#', 1, 1, 0x01, 0x00, 0, 0, 0];
        data.push(b'(');
        data.extend([b'$', 0xff, 1, 0, 0, 0]);
        data.push(b')');
        data.extend(42i32.to_le_bytes());
        let (el, len) = parse_element(&data, 0, None, &mut b'@').unwrap();
        assert_eq!(len, data.len());
        match el {
            BytecodeElement::GotoIf { condition, target_id } => {
                assert_eq!(condition, Some(Expression::IntConstant(1)));
                assert_eq!(target_id, 42);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
