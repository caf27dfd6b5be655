//! Info command for showing the server identity.

use std::io::Write;

use anyhow::Result;

use crate::{ActivityApi, ServerApi};

pub fn run<W: Write>(writer: &mut W, api: &ServerApi) -> Result<()> {
    let info = api.get_info()?;
    writeln!(writer, "{}", serde_json::to_string_pretty(&info)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use aw_datastore::{Datastore, MemoryStorage};
    use insta::assert_snapshot;

    use crate::ApiSettings;

    #[test]
    fn info_prints_identity_as_json() {
        let settings = ApiSettings {
            hostname: "devbox".to_string(),
            device_id: "00000000-0000-4000-8000-000000000000".to_string(),
            testing: true,
            ..ApiSettings::default()
        };
        let api = ServerApi::new(Datastore::new(MemoryStorage::new()), settings);
        let mut output = Vec::new();

        run(&mut output, &api).unwrap();

        let output = String::from_utf8(output)
            .unwrap()
            .replace(env!("CARGO_PKG_VERSION"), "[version]");
        assert_snapshot!(output, @r#"
        {
          "hostname": "devbox",
          "version": "[version]",
          "testing": true,
          "device_id": "00000000-0000-4000-8000-000000000000"
        }
        "#);
    }
}
