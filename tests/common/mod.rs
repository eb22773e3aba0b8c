use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

fn text_content(lines: &[&str]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
        Operation::new("TL", vec![14.into()]),
        Operation::new("Td", vec![72.into(), 760.into()]),
    ];
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
    }
    operations.push(Operation::new("ET", vec![]));

    Ok(Content { operations }.encode()?)
}

fn write_pdf(path: &Path, contents: Vec<Vec<u8>>) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut page_ids = Vec::with_capacity(contents.len());
    for content in contents {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        page_ids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        }));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<Object>>(),
            "Count" => i64::try_from(page_ids.len())?,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc.save(path)?;
    Ok(())
}

/// Writes a PDF with one page per entry, each line emitted as its own
/// `Tj` and separated by `T*`.
pub fn write_manual_pdf(
    path: &Path,
    pages: &[Vec<&str>],
) -> Result<(), Box<dyn std::error::Error>> {
    let contents = pages
        .iter()
        .map(|lines| text_content(lines))
        .collect::<Result<Vec<_>, _>>()?;
    write_pdf(path, contents)
}

/// Like `write_manual_pdf`, but page `unreadable` (1-based) gets a content
/// stream with no text operators in it.
pub fn write_pdf_with_unreadable_page(
    path: &Path,
    pages: &[Vec<&str>],
    unreadable: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut contents = pages
        .iter()
        .map(|lines| text_content(lines))
        .collect::<Result<Vec<_>, _>>()?;
    contents.insert(unreadable - 1, b"\x00\x9f\xfe ((( <<< garbage".to_vec());
    write_pdf(path, contents)
}

/// Three pages with the alias table on page 2.
pub fn manual_pages() -> Vec<Vec<&'static str>> {
    vec![
        vec!["Introduction", "This manual describes property methods."],
        vec!["Alias", "Name", "P11 P10", "H2O", "WATER", "Databanks"],
        vec!["Appendix", "See the property method reference."],
    ]
}
