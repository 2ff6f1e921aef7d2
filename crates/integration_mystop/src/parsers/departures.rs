//! Live departures (`StopDepartures/Get/{stopId}`)
//!
//! Agencies answer either with JSON or with a DataContract XML document.
//! Both shapes flatten into the same [`Departure`] list: one record per
//! upcoming departure of every route direction that is still in service.

use serde::Deserialize;
use serde_json::Value;

use super::{array_items, nonempty_string, raw_record, truthy, value_to_string};
use crate::decoder::{DecodedPayload, XmlElement};
use crate::models::Departure;

const UNKNOWN_DESTINATION: &str = "Unknown";

/// Flatten a decoded departures payload
///
/// An unparseable payload yields no departures.
#[must_use]
pub fn parse_departures(payload: &DecodedPayload) -> Vec<Departure> {
    match payload {
        DecodedPayload::Json(value) => parse_departures_json(value),
        DecodedPayload::Xml(root) => parse_departures_xml(root),
        DecodedPayload::Unparseable => Vec::new(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawStopDeparture {
    route_directions: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawRouteDirection {
    route_id: Value,
    direction_code: Value,
    is_done: Value,
    departures: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawDeparture {
    trip: Value,
    #[serde(rename = "ETALocalTime")]
    eta_local_time: Value,
    #[serde(rename = "STALocalTime")]
    sta_local_time: Value,
    stop_status_report_label: Value,
    mode: Value,
}

/// Flatten the JSON form: a single stop-departure object or an array of them
#[must_use]
pub fn parse_departures_json(data: &Value) -> Vec<Departure> {
    let entries = match data {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    };

    let mut departures = Vec::new();
    for entry in entries.iter().filter_map(raw_record::<RawStopDeparture>) {
        for direction in array_items(&entry.route_directions)
            .iter()
            .filter_map(raw_record::<RawRouteDirection>)
        {
            if truthy(&direction.is_done) || !truthy(&direction.departures) {
                continue;
            }

            let route_id = value_to_string(&direction.route_id);
            let direction_code = value_to_string(&direction.direction_code);

            departures.extend(
                array_items(&direction.departures)
                    .iter()
                    .filter_map(raw_record::<RawDeparture>)
                    .map(|dep| Departure {
                        route_id: route_id.clone(),
                        direction: direction_code.clone(),
                        destination: json_destination(&dep.trip),
                        eta: nonempty_string(&dep.eta_local_time)
                            .or_else(|| nonempty_string(&dep.sta_local_time)),
                        status: value_to_string(&dep.stop_status_report_label),
                        is_realtime: dep
                            .mode
                            .as_f64()
                            .is_none_or(|mode| mode != 0.0),
                    }),
            );
        }
    }
    departures
}

fn json_destination(trip: &Value) -> String {
    nonempty_string(&trip["InternetServiceDesc"])
        .or_else(|| nonempty_string(&trip["InternalSignDesc"]))
        .unwrap_or_else(|| UNKNOWN_DESTINATION.to_string())
}

/// Flatten the XML form
///
/// A root named `ArrayOfStopDeparture` wraps `StopDeparture` children;
/// any other root is treated as a single stop-departure.
#[must_use]
pub fn parse_departures_xml(root: &XmlElement) -> Vec<Departure> {
    let entries: Vec<&XmlElement> = if root.tag == "ArrayOfStopDeparture" {
        root.find_all("StopDeparture").collect()
    } else {
        vec![root]
    };

    let mut departures = Vec::new();
    for entry in entries {
        let Some(route_directions) = entry.find("RouteDirections") else {
            continue;
        };

        for direction in route_directions.find_all("RouteDirection") {
            if direction
                .find_text("IsDone")
                .is_some_and(|done| done.eq_ignore_ascii_case("true"))
            {
                continue;
            }

            let Some(departures_node) = direction.find("Departures") else {
                continue;
            };
            if !departures_node.has_children() {
                continue;
            }

            let route_id = direction.find_text("RouteId").map(str::to_string);
            let direction_code = direction.find_text("DirectionCode").map(str::to_string);

            departures.extend(departures_node.find_all("Departure").map(|dep| Departure {
                route_id: route_id.clone(),
                direction: direction_code.clone(),
                destination: xml_destination(dep.find("Trip")),
                eta: dep
                    .find_nonempty_text("ETALocalTime")
                    .or_else(|| dep.find_nonempty_text("STALocalTime"))
                    .map(str::to_string),
                status: dep.find_text("StopStatusReportLabel").map(str::to_string),
                is_realtime: dep.find_text("Mode") != Some("0"),
            }));
        }
    }
    departures
}

fn xml_destination(trip: Option<&XmlElement>) -> String {
    trip.and_then(|trip| {
        trip.find_nonempty_text("InternetServiceDesc")
            .or_else(|| trip.find_nonempty_text("InternalSignDesc"))
    })
    .unwrap_or(UNKNOWN_DESTINATION)
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decode_payload, parse_xml};
    use serde_json::json;

    fn json_fixture() -> Value {
        json!([{
            "StopId": 101,
            "RouteDirections": [
                {
                    "RouteId": 5,
                    "DirectionCode": "O",
                    "IsDone": false,
                    "Departures": [{
                        "ETALocalTime": "2024-05-01T08:15:00",
                        "STALocalTime": "2024-05-01T08:10:00",
                        "StopStatusReportLabel": "On Time",
                        "Mode": 1,
                        "Trip": {"InternetServiceDesc": "Downtown", "InternalSignDesc": "DT"}
                    }]
                },
                {
                    "RouteId": 6,
                    "DirectionCode": "I",
                    "IsDone": true,
                    "Departures": [{"ETALocalTime": "2024-05-01T08:20:00", "Mode": 1}]
                }
            ]
        }])
    }

    const XML_FIXTURE: &str = r#"<ArrayOfStopDeparture xmlns:i="http://www.w3.org/2001/XMLSchema-instance" xmlns="http://schemas.datacontract.org/2004/07/Availtec.MyAvail.TIDS.DataManager.Models">
  <StopDeparture>
    <RouteDirections>
      <RouteDirection>
        <Departures>
          <Departure>
            <ETALocalTime>2024-05-01T08:15:00</ETALocalTime>
            <Mode>1</Mode>
            <STALocalTime>2024-05-01T08:10:00</STALocalTime>
            <StopStatusReportLabel>On Time</StopStatusReportLabel>
            <Trip>
              <InternalSignDesc>DT</InternalSignDesc>
              <InternetServiceDesc>Downtown</InternetServiceDesc>
            </Trip>
          </Departure>
        </Departures>
        <DirectionCode>O</DirectionCode>
        <IsDone>false</IsDone>
        <RouteId>5</RouteId>
      </RouteDirection>
      <RouteDirection>
        <Departures>
          <Departure><ETALocalTime>2024-05-01T08:20:00</ETALocalTime><Mode>1</Mode></Departure>
        </Departures>
        <DirectionCode>I</DirectionCode>
        <IsDone>True</IsDone>
        <RouteId>6</RouteId>
      </RouteDirection>
    </RouteDirections>
    <StopId>101</StopId>
  </StopDeparture>
</ArrayOfStopDeparture>"#;

    fn expected() -> Vec<Departure> {
        vec![Departure {
            route_id: Some("5".to_string()),
            direction: Some("O".to_string()),
            destination: "Downtown".to_string(),
            eta: Some("2024-05-01T08:15:00".to_string()),
            status: Some("On Time".to_string()),
            is_realtime: true,
        }]
    }

    #[test]
    fn test_done_directions_skipped_json() {
        assert_eq!(parse_departures_json(&json_fixture()), expected());
    }

    #[test]
    fn test_json_and_xml_agree() {
        let from_json = parse_departures(&DecodedPayload::Json(json_fixture()));
        let from_xml = parse_departures(&decode_payload(XML_FIXTURE));
        assert_eq!(from_json, from_xml);
        assert_eq!(from_xml, expected());
    }

    #[test]
    fn test_single_object_json() {
        let data = json!({
            "RouteDirections": [{
                "RouteId": "12",
                "DirectionCode": "I",
                "Departures": [{"STALocalTime": "08:00", "ETALocalTime": "", "Mode": 0}]
            }]
        });
        let departures = parse_departures_json(&data);
        assert_eq!(departures.len(), 1);
        assert_eq!(departures[0].route_id.as_deref(), Some("12"));
        assert_eq!(departures[0].eta.as_deref(), Some("08:00"));
        assert_eq!(departures[0].destination, "Unknown");
        assert!(!departures[0].is_realtime);
    }

    #[test]
    fn test_destination_fallback_chain() {
        let data = json!({"RouteDirections": [{"RouteId": 1, "Departures": [
            {"Trip": {"InternetServiceDesc": "", "InternalSignDesc": "Sign"}},
            {"Trip": {}},
            {}
        ]}]});
        let destinations: Vec<_> = parse_departures_json(&data)
            .into_iter()
            .map(|d| d.destination)
            .collect();
        assert_eq!(destinations, vec!["Sign", "Unknown", "Unknown"]);
    }

    #[test]
    fn test_empty_or_missing_departures_skipped() {
        let data = json!([{"RouteDirections": [
            {"RouteId": 1, "Departures": []},
            {"RouteId": 2}
        ]}]);
        assert!(parse_departures_json(&data).is_empty());
        assert!(parse_departures_json(&json!([])).is_empty());
        assert!(parse_departures_json(&json!("nope")).is_empty());
    }

    #[test]
    fn test_missing_mode_is_realtime() {
        let data = json!({"RouteDirections": [{"RouteId": 1, "Departures": [{"ETALocalTime": "x"}]}]});
        assert!(parse_departures_json(&data)[0].is_realtime);
    }

    #[test]
    fn test_xml_single_root_and_missing_children() {
        let root = parse_xml(
            "<StopDeparture><RouteDirections><RouteDirection>\
             <Departures><Departure><Mode>0</Mode></Departure></Departures>\
             </RouteDirection></RouteDirections></StopDeparture>",
        )
        .unwrap();
        let departures = parse_departures_xml(&root);
        assert_eq!(
            departures,
            vec![Departure {
                route_id: None,
                direction: None,
                destination: "Unknown".to_string(),
                eta: None,
                status: None,
                is_realtime: false,
            }]
        );
    }

    #[test]
    fn test_xml_empty_departures_node_skipped() {
        let root = parse_xml(
            "<StopDeparture><RouteDirections><RouteDirection>\
             <Departures/><RouteId>1</RouteId>\
             </RouteDirection></RouteDirections></StopDeparture>",
        )
        .unwrap();
        assert!(parse_departures_xml(&root).is_empty());
    }

    #[test]
    fn test_xml_array_with_several_stop_departures() {
        let body = r#"<ArrayOfStopDeparture xmlns:i="http://www.w3.org/2001/XMLSchema-instance" xmlns="http://schemas.datacontract.org/2004/07/Availtec.MyAvail.TIDS.DataManager.Models">
  <StopDeparture>
    <RouteDirections><RouteDirection>
      <Departures><Departure><ETALocalTime>2024-05-01T08:15:00</ETALocalTime></Departure></Departures>
      <RouteId>5</RouteId>
    </RouteDirection></RouteDirections>
    <StopId>101</StopId>
  </StopDeparture>
  <StopDeparture>
    <RouteDirections><RouteDirection>
      <Departures>
        <Departure><ETALocalTime>2024-05-01T08:30:00</ETALocalTime></Departure>
        <Departure><ETALocalTime>2024-05-01T09:00:00</ETALocalTime></Departure>
      </Departures>
      <RouteId>9</RouteId>
    </RouteDirection></RouteDirections>
    <StopId>101</StopId>
  </StopDeparture>
</ArrayOfStopDeparture>"#;

        let departures = parse_departures(&decode_payload(body));
        let summary: Vec<_> = departures
            .iter()
            .map(|d| (d.route_id.as_deref(), d.eta.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Some("5"), Some("2024-05-01T08:15:00")),
                (Some("9"), Some("2024-05-01T08:30:00")),
                (Some("9"), Some("2024-05-01T09:00:00")),
            ]
        );
    }

    #[test]
    fn test_xml_nil_elements_fall_back() {
        let body = r#"<ArrayOfStopDeparture xmlns:i="http://www.w3.org/2001/XMLSchema-instance" xmlns="http://schemas.datacontract.org/2004/07/Availtec.MyAvail.TIDS.DataManager.Models">
  <StopDeparture>
    <RouteDirections><RouteDirection>
      <Departures>
        <Departure>
          <ETALocalTime i:nil="true"/>
          <Mode>0</Mode>
          <STALocalTime>2024-05-01T08:10:00</STALocalTime>
          <Trip>
            <InternalSignDesc>Depot</InternalSignDesc>
            <InternetServiceDesc i:nil="true"/>
          </Trip>
        </Departure>
        <Departure>
          <ETALocalTime i:nil="true"/>
          <STALocalTime i:nil="true"/>
          <Trip i:nil="true"/>
        </Departure>
      </Departures>
      <DirectionCode>I</DirectionCode>
      <IsDone>false</IsDone>
      <RouteId>7</RouteId>
    </RouteDirection></RouteDirections>
  </StopDeparture>
</ArrayOfStopDeparture>"#;

        let departures = parse_departures(&decode_payload(body));
        assert_eq!(departures.len(), 2);

        assert_eq!(departures[0].eta.as_deref(), Some("2024-05-01T08:10:00"));
        assert_eq!(departures[0].destination, "Depot");
        assert!(!departures[0].is_realtime);

        assert_eq!(departures[1].eta, None);
        assert_eq!(departures[1].destination, "Unknown");
        assert_eq!(departures[1].route_id.as_deref(), Some("7"));
        assert!(departures[1].is_realtime);
    }

    #[test]
    fn test_unparseable_yields_nothing() {
        assert!(parse_departures(&DecodedPayload::Unparseable).is_empty());
    }
}
